//! Generic optimistic toggle shared by like, save, share, follow and block.

use std::marker::PhantomData;
use std::sync::Arc;

use super::{MutationError, MutationPhase, MutationResult, PhaseTracker, ToggleExecutor, ToggleOutcome};
use crate::auth::AuthContext;
use crate::cache::{CacheStore, CacheStoreExt, QueryKey};
use crate::models::Entity;

/// Notified on every phase change with the target id
pub type PhaseListener = Arc<dyn Fn(&str, MutationPhase) + Send + Sync>;

/// Boolean flag on an entity plus the counter that moves with it
pub trait ToggleField<T>: Send + Sync {
    fn is_on(&self, entity: &T) -> bool;

    fn set_on(&self, entity: &mut T, on: bool);

    fn counter<'a>(&self, _entity: &'a mut T) -> Option<&'a mut i64> {
        None
    }

    /// Copy of `entity` with the flag set to `on`, moving the counter by
    /// one (never below zero). `None` when the flag already reads `on`.
    fn with_state(&self, entity: &T, on: bool) -> Option<T>
    where
        T: Clone,
    {
        if self.is_on(entity) == on {
            return None;
        }
        let mut next = entity.clone();
        self.set_on(&mut next, on);
        if let Some(counter) = self.counter(&mut next) {
            *counter = if on {
                counter.saturating_add(1)
            } else {
                counter.saturating_sub(1).max(0)
            };
        }
        Some(next)
    }
}

/// One toggle action wired to the cache, the signed-in actor and a remote
/// executor.
///
/// Each [`run`](Self::run) is an independent mutation. Overlapping runs for
/// the same entity are not serialized; reconciliation makes the last answer
/// from the server win.
pub struct OptimisticToggle<T, E, F> {
    name: &'static str,
    cache: Arc<dyn CacheStore>,
    auth: Arc<dyn AuthContext>,
    executor: E,
    field: F,
    patch_pattern: QueryKey,
    invalidate_patterns: Vec<QueryKey>,
    listener: Option<PhaseListener>,
    entity: PhantomData<fn() -> T>,
}

impl<T, E, F> OptimisticToggle<T, E, F>
where
    T: Entity,
    E: ToggleExecutor,
    F: ToggleField<T>,
{
    pub fn new(
        name: &'static str,
        cache: Arc<dyn CacheStore>,
        auth: Arc<dyn AuthContext>,
        executor: E,
        field: F,
        patch_pattern: QueryKey,
    ) -> Self {
        Self {
            name,
            cache,
            auth,
            executor,
            field,
            invalidate_patterns: vec![patch_pattern.clone()],
            patch_pattern,
            listener: None,
            entity: PhantomData,
        }
    }

    /// Also mark these query groups stale on settle. Patterns already
    /// covered by a broader one are dropped.
    #[must_use]
    pub fn invalidating(mut self, patterns: impl IntoIterator<Item = QueryKey>) -> Self {
        self.invalidate_patterns.extend(patterns);
        let all = std::mem::take(&mut self.invalidate_patterns);
        for pattern in &all {
            let covered = all
                .iter()
                .any(|other| other != pattern && pattern.matches(other));
            if !covered && !self.invalidate_patterns.contains(pattern) {
                self.invalidate_patterns.push(pattern.clone());
            }
        }
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: PhaseListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn patch_pattern(&self) -> &QueryKey {
        &self.patch_pattern
    }

    pub fn invalidate_patterns(&self) -> &[QueryKey] {
        &self.invalidate_patterns
    }

    /// Toggle `target_id` for the signed-in actor.
    ///
    /// Fails with [`MutationError::Auth`] before touching the cache when
    /// nobody is signed in. A remote failure restores the cache to its
    /// pre-mutation contents and is returned to the caller.
    pub async fn run(&self, target_id: &str) -> MutationResult<ToggleOutcome> {
        let Some(actor_id) = self.auth.current_actor() else {
            tracing::debug!(action = self.name, target_id, "Toggle rejected: not signed in");
            return Err(MutationError::Auth);
        };

        let mut tracker = PhaseTracker::new();
        let cancelled = self.cache.cancel_queries(&self.patch_pattern);
        let snapshot = self.cache.snapshot(&self.patch_pattern);
        let guess = self.apply_optimistic(target_id);
        tracing::debug!(
            action = self.name,
            target_id,
            guess = ?guess,
            cancelled,
            captured = snapshot.len(),
            "Optimistic patch applied"
        );
        self.advance(&mut tracker, target_id, MutationPhase::OptimisticApplied)?;

        let result = match self.executor.execute(&actor_id, target_id).await {
            Ok(outcome) => {
                drop(snapshot);
                self.advance(&mut tracker, target_id, MutationPhase::RemoteOk)?;
                self.reconcile(&outcome, guess);
                self.advance(&mut tracker, target_id, MutationPhase::Reconciled)?;
                Ok(outcome)
            }
            Err(error) => {
                self.advance(&mut tracker, target_id, MutationPhase::RemoteFailed)?;
                let restored = snapshot.len();
                self.cache.restore(snapshot);
                tracing::warn!(
                    action = self.name,
                    target_id,
                    restored,
                    %error,
                    "Toggle failed; cache rolled back"
                );
                self.advance(&mut tracker, target_id, MutationPhase::RolledBack)?;
                Err(error)
            }
        };

        let invalidated = self
            .invalidate_patterns
            .iter()
            .map(|pattern| self.cache.invalidate(pattern))
            .sum::<usize>();
        self.advance(&mut tracker, target_id, MutationPhase::Settled)?;
        tracing::info!(
            action = self.name,
            target_id,
            ok = result.is_ok(),
            invalidated,
            "Toggle settled"
        );
        result
    }

    /// Flip every cached copy to the negation of the first one found.
    /// Returns the guessed state, or `None` if the entity is not cached.
    fn apply_optimistic(&self, target_id: &str) -> Option<bool> {
        let current = self
            .cache
            .find_entity::<T>(&self.patch_pattern, target_id)?;
        let target = !self.field.is_on(&current);
        self.cache
            .patch_entity::<T, _>(&self.patch_pattern, target_id, |entity| {
                self.field.with_state(entity, target)
            });
        Some(target)
    }

    fn reconcile(&self, outcome: &ToggleOutcome, guess: Option<bool>) {
        let corrected = self.cache.patch_entity::<T, _>(
            &self.patch_pattern,
            &outcome.target_id,
            |entity| self.field.with_state(entity, outcome.new_state),
        );
        if corrected > 0 {
            tracing::debug!(
                action = self.name,
                target_id = %outcome.target_id,
                new_state = outcome.new_state,
                guess = ?guess,
                corrected,
                "Race inconsistency: cached state disagreed with server, reconciled"
            );
        }
    }

    fn advance(
        &self,
        tracker: &mut PhaseTracker,
        target_id: &str,
        next: MutationPhase,
    ) -> MutationResult<()> {
        tracker.advance(next)?;
        if let Some(listener) = &self.listener {
            listener(target_id, next);
        }
        Ok(())
    }
}
