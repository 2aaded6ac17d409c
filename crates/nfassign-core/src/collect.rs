//! This module defines the [`RunCollector`], which repeats assignment attempts until the requested
//! number of runs has been accepted and committed to a [`FlowTable`].

use log::debug;
use rand::prelude::*;
use rayon::prelude::*;

use crate::action::ActionSet;
use crate::assign::{AssignError, Attempt, ShareAssigner};
use crate::flow::FlowTable;
use crate::ident::RunId;

/// Run collection options.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct RunOpts {
    /// Number of runs to collect.
    pub nr_runs: usize,
    /// Accepted deviation of a realized share from its target.
    pub max_err: f64,
    /// Upper bound on the number of attempts. Unbounded if `None`.
    #[builder(default)]
    pub max_attempts: Option<u64>,
    /// Number of attempts generated concurrently.
    #[builder(default = num_cpus::get())]
    pub batch_size: usize,
}

/// Progress of a collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Runs committed so far.
    pub runs: usize,
    /// Attempts made so far, including rejected ones.
    pub attempts: u64,
}

/// Collects runs by repeatedly invoking a [`ShareAssigner`].
#[derive(Debug, derive_new::new)]
pub struct RunCollector<'a> {
    assigner: ShareAssigner<'a>,
    nr_runs: usize,
    max_attempts: Option<u64>,
    batch_size: usize,
}

impl<'a> RunCollector<'a> {
    pub fn from_opts(actions: &'a ActionSet, opts: &RunOpts) -> Result<Self, AssignError> {
        let assigner = ShareAssigner::new(actions, opts.max_err)?;
        Ok(Self::new(
            assigner,
            opts.nr_runs,
            opts.max_attempts,
            opts.batch_size,
        ))
    }

    /// Commits `nr_runs` accepted assignments to `table`.
    pub fn collect<R>(
        &self,
        table: &mut FlowTable,
        rng: &mut R,
    ) -> Result<CollectStats, CollectError>
    where
        R: Rng + ?Sized,
    {
        self.collect_with(table, rng, |_, _| {})
    }

    /// Like [`RunCollector::collect`], but calls `on_commit` after every committed run.
    ///
    /// A collection draws exactly one value from `rng` to seed its own generator, which in turn
    /// seeds every attempt. Candidates are generated in batches on the rayon thread pool and
    /// consumed in seed order by a single writer, so the result only depends on `rng`, not on
    /// the batch size or the number of threads, and neither does the state `rng` is left in.
    /// Candidates left over once enough runs are committed are discarded and not counted as
    /// attempts.
    pub fn collect_with<R, F>(
        &self,
        table: &mut FlowTable,
        rng: &mut R,
        mut on_commit: F,
    ) -> Result<CollectStats, CollectError>
    where
        R: Rng + ?Sized,
        F: FnMut(RunId, &CollectStats),
    {
        let mut rng = StdRng::seed_from_u64(rng.gen());
        let mut stats = CollectStats::default();
        while stats.runs < self.nr_runs {
            let budget = match self.max_attempts {
                Some(max) if stats.attempts >= max => {
                    return Err(CollectError::Infeasible {
                        runs: stats.runs,
                        wanted: self.nr_runs,
                        attempts: stats.attempts,
                    })
                }
                Some(max) => max - stats.attempts,
                None => u64::MAX,
            };
            let batch = std::cmp::min(self.batch_size.max(1) as u64, budget) as usize;
            let seeds = (0..batch).map(|_| rng.gen::<u64>()).collect::<Vec<_>>();
            let candidates = {
                let table = &*table;
                seeds
                    .into_par_iter()
                    .map(|seed| {
                        let mut rng = StdRng::seed_from_u64(seed);
                        self.assigner.attempt(table, &mut rng)
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };
            let mut nr_rejected = 0;
            for candidate in candidates {
                stats.attempts += 1;
                match candidate {
                    Attempt::Accepted(assignment) => {
                        let run = table.commit(assignment);
                        stats.runs += 1;
                        debug!("run {run} accepted after {} attempts", stats.attempts);
                        on_commit(run, &stats);
                        if stats.runs == self.nr_runs {
                            break;
                        }
                    }
                    Attempt::Rejected(rejection) => {
                        nr_rejected += 1;
                        log::trace!(
                            "attempt rejected: action {} realized share {}",
                            rejection.action,
                            rejection.realized
                        );
                    }
                }
            }
            if nr_rejected > 0 {
                debug!("{nr_rejected} of {batch} attempts rejected");
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to attempt an assignment")]
    Assign(#[from] AssignError),

    #[error("collected {runs} of {wanted} runs within {attempts} attempts")]
    Infeasible {
        runs: usize,
        wanted: usize,
        attempts: u64,
    },
}
