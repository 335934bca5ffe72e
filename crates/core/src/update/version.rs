//! Worker version lifecycle.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle state of one worker version.
///
/// Transitions only move forward:
/// `Installing -> Waiting -> Active -> Redundant`, plus `Installing -> Redundant`
/// for failed or superseded installs and `Waiting -> Redundant` when a newer
/// version replaces a waiting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Redundant,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Installing, Waiting | Active | Redundant) | (Waiting, Active | Redundant) | (Active, Redundant)
        )
    }
}

/// One generation of the worker, identified by its deploy version tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerVersion {
    pub version_tag: String,
    pub state: WorkerState,
}

impl WorkerVersion {
    pub fn installing(version_tag: impl Into<String>) -> Self {
        Self { version_tag: version_tag.into(), state: WorkerState::Installing }
    }

    /// Move to `next`, rejecting backward or skipping moves.
    pub fn transition(&mut self, next: WorkerState) -> Result<(), Error> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition(format!(
                "{} cannot move from {:?} to {:?}",
                self.version_tag, self.state, next
            )));
        }
        tracing::debug!(version = %self.version_tag, from = ?self.state, to = ?next, "worker state change");
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        let mut v = WorkerVersion::installing("1.2.0");
        v.transition(WorkerState::Waiting).unwrap();
        assert!(v.transition(WorkerState::Installing).is_err());
        v.transition(WorkerState::Active).unwrap();
        assert!(v.transition(WorkerState::Waiting).is_err());
        v.transition(WorkerState::Redundant).unwrap();
        assert!(v.transition(WorkerState::Active).is_err());
    }

    #[test]
    fn test_redundant_is_terminal() {
        for next in [WorkerState::Installing, WorkerState::Waiting, WorkerState::Active, WorkerState::Redundant] {
            assert!(!WorkerState::Redundant.can_transition_to(next));
        }
    }
}
