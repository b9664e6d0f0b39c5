use crate::auth::{auth_client_for_profile, clear_stored_session, load_stored_session, AuthError};
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

#[allow(clippy::needless_pass_by_value)]
fn auth_error(error: AuthError) -> CliError {
    CliError::Auth(error.to_string())
}

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    match command {
        AuthCommands::Login {
            profile,
            email,
            password,
        } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let profile_config = config.profile(&profile_name).ok_or_else(|| {
                CliError::Config(format!(
                    "Profile '{profile_name}' is not configured. Run `murmur config init --profile {profile_name}` first."
                ))
            })?;
            let client = auth_client_for_profile(&profile_name, profile_config)
                .map_err(auth_error)?
                .ok_or_else(|| {
                    CliError::Config(format!(
                        "Profile '{profile_name}' is missing its Supabase URL or anon key."
                    ))
                })?;
            let session = client.sign_in(&email, &password).await.map_err(auth_error)?;
            let email_label = session.user.email.as_deref().unwrap_or("(no email)");
            tracing::info!(profile = %profile_name, user = %session.user.id, "Signed in");
            println!("Signed in profile '{profile_name}' as {email_label}");
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let Some(profile) = config.profile(&profile_name) else {
                println!("Profile '{profile_name}' is not configured.");
                return Ok(());
            };

            let session = match auth_client_for_profile(&profile_name, profile).map_err(auth_error)? {
                Some(client) => client.restore_session().await.map_err(auth_error)?,
                None => load_stored_session(&profile_name).map_err(auth_error)?,
            };

            if let Some(session) = session {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Profile '{}' is signed in as {} (user_id={}, expires_at={})",
                    profile_name, email_label, session.user.id, session.expires_at
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let stored_session = load_stored_session(&profile_name).map_err(auth_error)?;
            let client = match config.profile(&profile_name) {
                Some(profile) => auth_client_for_profile(&profile_name, profile).map_err(auth_error)?,
                None => None,
            };

            if let (Some(client), Some(session)) = (client, stored_session) {
                client
                    .sign_out(&session.access_token)
                    .await
                    .map_err(auth_error)?;
            } else {
                clear_stored_session(&profile_name).map_err(auth_error)?;
            }

            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}
