//! Optimistic mutations against the shared query cache.
//!
//! A toggle patches every cached copy of its entity before the network call
//! resolves, then either reconciles with the server's answer or rolls the
//! cache back, and finally invalidates the affected query groups.

mod executor;
mod phase;
mod toggle;

use thiserror::Error;

pub use executor::{toggle_edge, EdgeToggleExecutor, ToggleExecutor, ToggleOutcome};
pub use phase::{IllegalTransition, MutationPhase, PhaseTracker};
pub use toggle::{OptimisticToggle, PhaseListener, ToggleField};

use crate::backend::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// Nobody is signed in; raised before the cache is touched
    #[error("You must be signed in to do that")]
    Auth,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Phase(#[from] IllegalTransition),
}

pub type MutationResult<T> = Result<T, MutationError>;
