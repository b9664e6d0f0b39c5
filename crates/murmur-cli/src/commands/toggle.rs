use std::sync::Arc;

use murmur_core::mutation::MutationPhase;
use murmur_core::{SocialActions, ToggleAction};

use crate::commands::common::{normalize_identifier, ProfileConnection};
use crate::error::CliError;

/// Past-tense label for the state a toggle landed in
pub const fn outcome_label(action: ToggleAction, new_state: bool) -> &'static str {
    match (action, new_state) {
        (ToggleAction::Like, true) => "Liked",
        (ToggleAction::Like, false) => "Unliked",
        (ToggleAction::Save, true) => "Saved",
        (ToggleAction::Save, false) => "Unsaved",
        (ToggleAction::Share, true) => "Shared",
        (ToggleAction::Share, false) => "Unshared",
        (ToggleAction::Follow, true) => "Followed",
        (ToggleAction::Follow, false) => "Unfollowed",
        (ToggleAction::Block, true) => "Blocked",
        (ToggleAction::Block, false) => "Unblocked",
    }
}

pub const fn target_noun(action: ToggleAction) -> &'static str {
    match action {
        ToggleAction::Like | ToggleAction::Save | ToggleAction::Share => "post",
        ToggleAction::Follow | ToggleAction::Block => "user",
    }
}

pub async fn run_toggle(
    action: ToggleAction,
    target_id: &str,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let target_id = normalize_identifier(target_id)?;
    let connection = ProfileConnection::open(global_profile).await?;
    connection.require_signed_in()?;

    let actions = SocialActions::new(
        connection.cache(),
        connection.auth_context(),
        Arc::clone(&connection.api),
    )
    .with_listener(Arc::new(|name: &str, phase: MutationPhase| {
        tracing::debug!(action = name, phase = %phase, "Toggle phase");
    }));

    let outcome = actions.run(action, &target_id).await?;
    println!(
        "{} {} {}",
        outcome_label(action, outcome.new_state),
        target_noun(action),
        outcome.target_id
    );
    Ok(())
}
