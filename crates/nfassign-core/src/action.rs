//! This module defines [`Action`]s, the per-packet cost models that flows are assigned to, and
//! the validated [`ActionSet`] they are collected in.

use std::ops::Index;

use crate::constants::SHARE_EPSILON;
use crate::ident::ActionId;
use crate::units::{Bytes, Instructions};

/// An action as it appears in a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionSpec {
    /// Instructions executed for every packet.
    pub ipp_base: u64,
    /// Instructions executed for every payload byte.
    pub ipp_payload: u64,
    /// Target fraction of the trace's bytes.
    pub share: f64,
}

/// A network-function cost model with a target traffic share.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Action {
    pub id: ActionId,
    pub ipp_base: Instructions,
    pub ipp_payload: Instructions,
    pub share: f64,
}

impl Action {
    /// Instructions needed to process one packet carrying `payload` bytes.
    pub fn instructions(&self, payload: Bytes) -> Instructions {
        self.ipp_base + self.ipp_payload.times(payload.into_u64())
    }

    /// Instructions needed to process `nr_pkts` packets carrying `payload` bytes in total.
    pub fn instructions_bulk(&self, nr_pkts: u64, payload: Bytes) -> Instructions {
        self.ipp_base.times(nr_pkts) + self.ipp_payload.times(payload.into_u64())
    }
}

/// A non-empty list of actions whose shares add up to one.
#[derive(Debug, Clone)]
pub struct ActionSet {
    actions: Vec<Action>,
}

impl ActionSet {
    /// Validates a list of action specifications. Actions are identified by their position.
    ///
    /// Correctness properties:
    ///
    /// - There must be at least one action.
    /// - Every share must lie in [0, 1].
    /// - The shares must add up to 1.0 within `SHARE_EPSILON`.
    pub fn new(specs: Vec<ActionSpec>) -> Result<Self, ActionError> {
        // CORRECTNESS: There must be at least one action.
        if specs.is_empty() {
            return Err(ActionError::Empty);
        }
        // CORRECTNESS: Every share must lie in [0, 1].
        if let Some((i, spec)) = specs
            .iter()
            .enumerate()
            .find(|(_, s)| !(0.0..=1.0).contains(&s.share))
        {
            return Err(ActionError::ShareOutOfRange {
                id: ActionId::new(i),
                share: spec.share,
            });
        }
        // CORRECTNESS: The shares must add up to 1.0 within `SHARE_EPSILON`.
        let sum = specs.iter().map(|s| s.share).sum::<f64>();
        if (1.0 - sum).abs() > SHARE_EPSILON {
            return Err(ActionError::ShareSum(sum));
        }
        let actions = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Action {
                id: ActionId::new(i),
                ipp_base: Instructions::new(spec.ipp_base),
                ipp_payload: Instructions::new(spec.ipp_payload),
                share: spec.share,
            })
            .collect();
        Ok(Self { actions })
    }

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.inner())
    }

    delegate::delegate! {
        to self.actions {
            #[call(len)]
            pub fn nr_actions(&self) -> usize;

            pub fn iter(&self) -> std::slice::Iter<'_, Action>;
        }
    }
}

impl Index<ActionId> for ActionSet {
    type Output = Action;

    fn index(&self, id: ActionId) -> &Self::Output {
        &self.actions[id.inner()]
    }
}

/// Invalid action configurations.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("no actions configured")]
    Empty,

    #[error("action {id} has share {share}, expected a value in [0, 1]")]
    ShareOutOfRange { id: ActionId, share: f64 },

    #[error("action shares add up to {0}, expected 1.0")]
    ShareSum(f64),
}
