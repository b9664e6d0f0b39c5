//! Remote half of a toggle: read the edge, then insert or delete it.

use std::future::Future;
use std::sync::Arc;

use super::{MutationError, MutationResult};
use crate::auth::AuthContext;
use crate::backend::{DataApi, EdgeRelation};

/// Authoritative result of a remote toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub target_id: String,
    pub new_state: bool,
}

/// Performs the remote write for one toggle on behalf of `actor_id`
pub trait ToggleExecutor: Send + Sync {
    fn execute(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> impl Future<Output = MutationResult<ToggleOutcome>> + Send;
}

/// Toggles a row of an [`EdgeRelation`].
///
/// The existence check and the write are separate requests, so two
/// concurrent toggles of the same pair can both insert or both delete.
pub struct EdgeToggleExecutor<D> {
    api: Arc<D>,
    relation: EdgeRelation,
}

impl<D> Clone for EdgeToggleExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            relation: self.relation,
        }
    }
}

impl<D: DataApi> EdgeToggleExecutor<D> {
    pub const fn new(api: Arc<D>, relation: EdgeRelation) -> Self {
        Self { api, relation }
    }

    pub const fn relation(&self) -> &EdgeRelation {
        &self.relation
    }
}

impl<D: DataApi> ToggleExecutor for EdgeToggleExecutor<D> {
    async fn execute(&self, actor_id: &str, target_id: &str) -> MutationResult<ToggleOutcome> {
        let existing = self
            .api
            .find_edge(&self.relation, actor_id, target_id)
            .await?;

        let new_state = if existing.is_some() {
            self.api
                .delete_edge(&self.relation, actor_id, target_id)
                .await?;
            false
        } else {
            self.api
                .insert_edge(&self.relation, actor_id, target_id)
                .await?;
            true
        };

        Ok(ToggleOutcome {
            target_id: target_id.to_string(),
            new_state,
        })
    }
}

/// Toggle the edge for whoever `auth` says is signed in
pub async fn toggle_edge<E: ToggleExecutor>(
    executor: &E,
    auth: &dyn AuthContext,
    target_id: &str,
) -> MutationResult<ToggleOutcome> {
    let actor_id = auth.current_actor().ok_or(MutationError::Auth)?;
    executor.execute(&actor_id, target_id).await
}
