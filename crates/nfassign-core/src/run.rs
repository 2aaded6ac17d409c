use log::{info, warn};
use rand::Rng;

use crate::action::ActionSet;
use crate::collect::{CollectError, CollectStats, RunCollector, RunOpts};
use crate::export::{ExportError, Exporter};
use crate::flow::{FlowTable, FlowTableError};
use crate::ident::RunId;
use crate::packet::PacketSource;

/// The core `nfassign` routine. This builds the flow table of a trace and commits
/// `opts.nr_runs` accepted action assignments to it.
///
/// This function returns an error if the trace cannot be read, carries no bytes, or if the
/// attempt budget runs out before enough runs are accepted.
pub fn run<S, R>(
    source: &S,
    actions: &ActionSet,
    opts: &RunOpts,
    rng: &mut R,
) -> Result<Collection, Error>
where
    S: PacketSource,
    R: Rng + ?Sized,
{
    run_with(source, actions, opts, rng, |_, _| {})
}

/// Like [`run`], but calls `on_commit` after every committed run.
pub fn run_with<S, R, F>(
    source: &S,
    actions: &ActionSet,
    opts: &RunOpts,
    rng: &mut R,
    on_commit: F,
) -> Result<Collection, Error>
where
    S: PacketSource,
    R: Rng + ?Sized,
    F: FnMut(RunId, &CollectStats),
{
    let collector = RunCollector::from_opts(actions, opts).map_err(CollectError::from)?;
    let mut table = FlowTable::from_source(source)?;
    info!(
        "read {} flows carrying {} over {}",
        table.nr_flows(),
        table.total_bytes(),
        table.duration()
    );
    if table.duration().into_u64() == 0 {
        warn!("trace spans no time, capacities will be undefined");
    }
    let stats = collector.collect_with(&mut table, rng, on_commit)?;
    info!(
        "committed {} runs after {} attempts ({:.2}% accepted)",
        stats.runs,
        stats.attempts,
        100.0 * stats.runs as f64 / stats.attempts.max(1) as f64
    );
    Ok(Collection { table, stats })
}

/// A flow table with committed runs.
#[derive(Debug, Clone)]
pub struct Collection {
    pub table: FlowTable,
    pub stats: CollectStats,
}

impl Collection {
    /// An exporter for the committed runs.
    ///
    /// PRECONDITION: `actions` is the action set the runs were collected with.
    pub fn exporter<'a>(&'a self, actions: &'a ActionSet) -> Result<Exporter<'a>, ExportError> {
        Exporter::new(&self.table, actions)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to build flow table")]
    FlowTable(#[from] FlowTableError),

    #[error("failed to collect runs")]
    Collect(#[from] CollectError),
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use crate::assign::AssignError;
    use crate::packet::VecSource;
    use crate::testing;

    use super::*;

    fn opts(nr_runs: usize, max_err: f64) -> RunOpts {
        RunOpts::builder()
            .nr_runs(nr_runs)
            .max_err(max_err)
            .batch_size(4)
            .build()
    }

    #[test]
    fn run_commits_requested_runs() -> anyhow::Result<()> {
        let actions = testing::four_actions();
        let source = testing::random_trace(80, 2_000, 20);
        let mut rng = StdRng::seed_from_u64(20);
        let collection = run(&source, &actions, &opts(7, 0.05), &mut rng)?;
        assert_eq!(collection.table.nr_runs(), 7);
        assert_eq!(collection.stats.runs, 7);
        let exporter = collection.exporter(&actions)?;
        assert_eq!(exporter.dimensionings().len(), 7);
        Ok(())
    }

    #[test]
    fn empty_trace_fails() {
        let actions = testing::four_actions();
        let res = run(
            &VecSource::default(),
            &actions,
            &opts(1, 0.05),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(
            res,
            Err(Error::Collect(CollectError::Assign(AssignError::EmptyTrace)))
        ));
    }

    #[test]
    fn invalid_tolerance_fails_before_reading() {
        let actions = testing::four_actions();
        let res = run(
            &testing::single_packet_flows(&[100]),
            &actions,
            &opts(1, -1.0),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(
            res,
            Err(Error::Collect(CollectError::Assign(
                AssignError::InvalidTolerance(_)
            )))
        ));
    }
}
