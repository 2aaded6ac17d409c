//! A single attempt at assigning actions to flows.
//!
//! Flows are visited in a uniformly random order. The first flow is given action 0, and every
//! later flow goes to the action whose realized byte share currently falls furthest below its
//! target. An attempt is accepted only if every action ends up within `max_err` of its target
//! share. Because the greedy choice depends on the visiting order, individual attempts are noisy;
//! it is the ensemble of accepted attempts that represents the target shares.

use rand::prelude::*;

use crate::action::ActionSet;
use crate::flow::FlowTable;
use crate::ident::ActionId;
use crate::units::Bytes;

/// Assigns actions to the flows of a trace.
#[derive(Debug, Clone, Copy)]
pub struct ShareAssigner<'a> {
    actions: &'a ActionSet,
    max_err: f64,
}

impl<'a> ShareAssigner<'a> {
    /// Creates an assigner that accepts realized shares within `max_err` of their targets.
    pub fn new(actions: &'a ActionSet, max_err: f64) -> Result<Self, AssignError> {
        if !max_err.is_finite() || max_err < 0.0 {
            return Err(AssignError::InvalidTolerance(max_err));
        }
        Ok(Self { actions, max_err })
    }

    pub fn actions(&self) -> &'a ActionSet {
        self.actions
    }

    pub fn max_err(&self) -> f64 {
        self.max_err
    }

    /// Makes one assignment attempt. `table` is only read; accepted assignments must be
    /// committed separately.
    pub fn attempt<R>(&self, table: &FlowTable, rng: &mut R) -> Result<Attempt, AssignError>
    where
        R: Rng + ?Sized,
    {
        let total = table.total_bytes();
        if total == Bytes::ZERO {
            return Err(AssignError::EmptyTrace);
        }
        let flows = table.flows();
        let order = shuffled_order(flows.len(), rng);
        let mut assigned = vec![Bytes::ZERO; self.actions.nr_actions()];
        let mut choices = vec![ActionId::ZERO; flows.len()];
        for (pos, &i) in order.iter().enumerate() {
            let action = if pos == 0 {
                ActionId::ZERO
            } else {
                self.neediest(&assigned, total)
            };
            assigned[action.inner()] += flows[i].bytes;
            choices[i] = action;
        }
        // CORRECTNESS: Every byte must be assigned exactly once.
        let nr_assigned = assigned.iter().copied().sum::<Bytes>();
        if nr_assigned != total {
            return Err(AssignError::Unassigned {
                assigned: nr_assigned,
                total,
            });
        }
        for action in self.actions.iter() {
            let realized = share_of(assigned[action.id.inner()], total);
            if realized < action.share - self.max_err || realized > action.share + self.max_err {
                return Ok(Attempt::Rejected(Rejection {
                    action: action.id,
                    realized,
                }));
            }
        }
        Ok(Attempt::Accepted(Assignment {
            choices,
            bytes: assigned,
        }))
    }

    // The action furthest below its target share. Ties go to the lower ID, and if every action
    // has met its target the choice falls back to action 0.
    fn neediest(&self, assigned: &[Bytes], total: Bytes) -> ActionId {
        let mut choice = ActionId::ZERO;
        let mut max_err = 0.0;
        for action in self.actions.iter() {
            let err = action.share - share_of(assigned[action.id.inner()], total);
            if err > max_err {
                max_err = err;
                choice = action.id;
            }
        }
        choice
    }
}

fn share_of(bytes: Bytes, total: Bytes) -> f64 {
    bytes.into_f64() / total.into_f64()
}

/// A uniformly random permutation of `0..n` (Fisher-Yates).
pub(crate) fn shuffled_order<R>(n: usize, rng: &mut R) -> Vec<usize>
where
    R: Rng + ?Sized,
{
    let mut order = (0..n).collect::<Vec<_>>();
    order.shuffle(rng);
    order
}

/// The outcome of an assignment attempt.
#[derive(Debug, Clone)]
pub enum Attempt {
    Accepted(Assignment),
    Rejected(Rejection),
}

impl Attempt {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Attempt::Accepted(_))
    }

    pub fn accepted(self) -> Option<Assignment> {
        match self {
            Attempt::Accepted(a) => Some(a),
            Attempt::Rejected(_) => None,
        }
    }
}

/// An accepted assignment that has not been committed yet.
#[derive(Debug, Clone)]
pub struct Assignment {
    // Indexed by flow ID
    pub(crate) choices: Vec<ActionId>,
    // Indexed by action ID
    pub(crate) bytes: Vec<Bytes>,
}

impl Assignment {
    /// The action chosen for each flow, indexed by flow ID.
    pub fn choices(&self) -> &[ActionId] {
        &self.choices
    }

    /// Bytes assigned to each action, indexed by action ID.
    pub fn bytes(&self) -> &[Bytes] {
        &self.bytes
    }
}

/// The first action found outside its tolerance band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rejection {
    pub action: ActionId,
    pub realized: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    #[error("share tolerance must be a non-negative number (got {0})")]
    InvalidTolerance(f64),

    #[error("trace carries no bytes")]
    EmptyTrace,

    #[error("assigned {assigned} out of {total}")]
    Unassigned { assigned: Bytes, total: Bytes },
}
