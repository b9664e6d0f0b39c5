use std::env;

use murmur_core::config::{SUPABASE_ANON_KEY_ENV, SUPABASE_URL_ENV};
use murmur_core::util::is_http_url;
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config_profiles::{mask_key, normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            supabase_url,
            supabase_anon_key,
            no_activate,
        ),
        ConfigCommands::Show { profile, json } => {
            run_config_show(profile.as_deref().or(global_profile), json)
        }
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(
        &existing,
        supabase_url,
        supabase_anon_key,
        env::var(SUPABASE_URL_ENV).ok(),
        env::var(SUPABASE_ANON_KEY_ENV).ok(),
    )?;
    *config.profile_mut_or_default(&profile_name) = merged;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    tracing::info!(profile = %profile_name, path = %path.display(), "Saved CLI profile");
    println!("Saved profile '{profile_name}' to {}", path.display());
    if no_activate {
        println!("Active profile unchanged.");
    }
    Ok(())
}

/// Explicit flags win over `MURMUR_SUPABASE_*`, which win over what was
/// already stored. Both values must end up set.
pub fn merge_profile(
    existing: &CliProfile,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    env_url: Option<String>,
    env_anon_key: Option<String>,
) -> Result<CliProfile, CliError> {
    let url = normalize_text_option(supabase_url)
        .or_else(|| normalize_text_option(env_url))
        .or_else(|| existing.supabase_url())
        .ok_or_else(|| {
            CliError::Config(format!(
                "Supabase URL is required. Pass --supabase-url or set {SUPABASE_URL_ENV}."
            ))
        })?;
    if !is_http_url(&url) {
        return Err(CliError::Config(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    let anon_key = normalize_text_option(supabase_anon_key)
        .or_else(|| normalize_text_option(env_anon_key))
        .or_else(|| existing.supabase_anon_key())
        .ok_or_else(|| {
            CliError::Config(format!(
                "Supabase anon key is required. Pass --supabase-anon-key or set {SUPABASE_ANON_KEY_ENV}."
            ))
        })?;

    Ok(CliProfile {
        supabase_url: Some(url),
        supabase_anon_key: Some(anon_key),
    })
}

#[derive(Debug, Serialize)]
struct ProfileView {
    name: String,
    active: bool,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
}

pub fn run_config_show(profile_name: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    let view = ProfileView {
        active: config.active_profile.as_deref() == Some(profile_name.as_str()),
        supabase_url: profile.supabase_url(),
        supabase_anon_key: profile.supabase_anon_key().map(|key| mask_key(&key)),
        name: profile_name,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        let marker = if view.active { " (active)" } else { "" };
        println!("Profile '{}'{marker}", view.name);
        println!(
            "  supabase_url: {}",
            view.supabase_url.as_deref().unwrap_or("(unset)")
        );
        println!(
            "  supabase_anon_key: {}",
            view.supabase_anon_key.as_deref().unwrap_or("(unset)")
        );
    }
    Ok(())
}
