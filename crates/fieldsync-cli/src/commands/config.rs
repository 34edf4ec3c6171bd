use std::time::Duration;

use fieldsync_core::config::parse_engine_config;

use crate::cli::ConfigCommands;
use crate::config_profiles::{is_http_url, normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Field overrides passed to `config init`
#[derive(Debug, Default)]
pub struct ProfileOverrides {
    pub api_base_url: Option<String>,
    pub quota_bytes: Option<u64>,
    pub entities: Vec<String>,
    pub engine_json: Option<String>,
    pub settle_delay_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub retention_days: Option<u64>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            quota_bytes,
            entities,
            engine_json,
            settle_delay_ms,
            request_timeout_ms,
            retention_days,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileOverrides {
                api_base_url,
                quota_bytes,
                entities,
                engine_json,
                settle_delay_ms,
                request_timeout_ms,
                retention_days,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    overrides: ProfileOverrides,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_overrides(profile, overrides)?;
    profile.validate().map_err(CliError::Config)?;
    let ready = profile.api_base_url().is_some();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    if ready {
        println!("Sync is configured. Run `fieldsync sync` to push queued operations.");
    } else {
        println!("Profile '{profile_name}' is missing: api_base_url");
    }
    Ok(())
}

pub fn apply_overrides(profile: &mut CliProfile, overrides: ProfileOverrides) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(overrides.api_base_url) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
        profile.api_base_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(quota) = overrides.quota_bytes {
        profile.quota_bytes = Some(quota);
    }
    if !overrides.entities.is_empty() {
        profile.entities = overrides.entities;
    }

    let mut engine = match normalize_text_option(overrides.engine_json) {
        Some(raw) => parse_engine_config(&raw).map_err(CliError::Config)?,
        None => profile.engine.clone(),
    };
    if let Some(ms) = overrides.settle_delay_ms {
        engine = engine.with_settle_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = overrides.request_timeout_ms {
        engine = engine.with_request_timeout(Duration::from_millis(ms));
    }
    if let Some(days) = overrides.retention_days {
        engine = engine.with_retention(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)));
    }
    profile.engine = engine;
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();

    println!("Profile: {profile_name}");
    println!("{}", serde_json::to_string_pretty(&profile)?);
    if CliProfile::api_token().is_some() {
        println!("API token: set via FIELDSYNC_API_TOKEN");
    }
    Ok(())
}
