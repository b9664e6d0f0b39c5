//! Error types for murmur-core

use thiserror::Error;

use crate::auth::AuthError;
use crate::backend::RemoteError;
use crate::config::ConfigError;
use crate::mutation::MutationError;

/// Result type alias using murmur-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in murmur-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Auth flow error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Backend data API error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Optimistic mutation error
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// Client configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}
