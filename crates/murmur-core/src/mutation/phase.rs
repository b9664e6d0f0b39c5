//! Lifecycle of one optimistic mutation

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationPhase {
    Idle,
    OptimisticApplied,
    RemoteOk,
    RemoteFailed,
    Reconciled,
    RolledBack,
    Settled,
}

impl MutationPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OptimisticApplied => "optimistic_applied",
            Self::RemoteOk => "remote_ok",
            Self::RemoteFailed => "remote_failed",
            Self::Reconciled => "reconciled",
            Self::RolledBack => "rolled_back",
            Self::Settled => "settled",
        }
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::OptimisticApplied)
                | (Self::OptimisticApplied, Self::RemoteOk | Self::RemoteFailed)
                | (Self::RemoteOk, Self::Reconciled)
                | (Self::RemoteFailed, Self::RolledBack)
                | (Self::Reconciled | Self::RolledBack, Self::Settled)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Settled)
    }
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal mutation transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: MutationPhase,
    pub to: MutationPhase,
}

/// Current phase of a mutation, advanced only along legal edges
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: MutationPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: MutationPhase::Idle,
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn advance(&mut self, next: MutationPhase) -> Result<MutationPhase, IllegalTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        let previous = self.phase;
        self.phase = next;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path() {
        let mut tracker = PhaseTracker::new();
        for phase in [
            MutationPhase::OptimisticApplied,
            MutationPhase::RemoteOk,
            MutationPhase::Reconciled,
            MutationPhase::Settled,
        ] {
            tracker.advance(phase).unwrap();
        }
        assert!(tracker.phase().is_terminal());
    }

    #[test]
    fn failure_path() {
        let mut tracker = PhaseTracker::new();
        for phase in [
            MutationPhase::OptimisticApplied,
            MutationPhase::RemoteFailed,
            MutationPhase::RolledBack,
            MutationPhase::Settled,
        ] {
            tracker.advance(phase).unwrap();
        }
        assert_eq!(tracker.phase(), MutationPhase::Settled);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut tracker = PhaseTracker::new();
        let error = tracker.advance(MutationPhase::Settled).unwrap_err();
        assert_eq!(error.from, MutationPhase::Idle);
        assert_eq!(tracker.phase(), MutationPhase::Idle);

        tracker.advance(MutationPhase::OptimisticApplied).unwrap();
        tracker.advance(MutationPhase::RemoteOk).unwrap();
        assert!(tracker.advance(MutationPhase::RolledBack).is_err());
    }

    #[test]
    fn settled_is_terminal() {
        let all = [
            MutationPhase::Idle,
            MutationPhase::OptimisticApplied,
            MutationPhase::RemoteOk,
            MutationPhase::RemoteFailed,
            MutationPhase::Reconciled,
            MutationPhase::RolledBack,
            MutationPhase::Settled,
        ];
        assert!(all
            .iter()
            .all(|next| !MutationPhase::Settled.can_transition_to(*next)));
    }
}
