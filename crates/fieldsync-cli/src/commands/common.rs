use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldsync_core::remote::{EndpointRegistry, HttpConnectivityProbe, HttpEntityEndpoint};
use fieldsync_core::{
    ConnectivityMonitor, LibSqlRecordStore, OfflineService, Operation, OperationId,
};
use serde::Serialize;
use serde_json::Value;

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

const PREVIEW_CHARS: usize = 48;

#[derive(Debug, Serialize)]
pub struct OperationListItem {
    pub id: String,
    pub entity_type: String,
    pub action: String,
    pub status: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub relative_time: String,
    pub payload: Value,
}

/// How the CLI decides whether the API is reachable
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectivityMode {
    /// Start offline; nothing is sent
    Offline,
    /// Probe the configured API once at startup
    Probe,
}

/// Resolved profile plus the service opened for it
pub struct CliSession {
    pub service: OfflineService,
    pub profile: CliProfile,
    pub probe: Option<HttpConnectivityProbe>,
}

impl CliSession {
    pub fn require_sync(&self) -> Result<&HttpConnectivityProbe, CliError> {
        self.probe.as_ref().ok_or(CliError::SyncNotConfigured)
    }
}

pub fn load_profile(profile_name: Option<&str>) -> Result<CliProfile, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&name).cloned().unwrap_or_default();
    profile.validate().map_err(CliError::Config)?;
    Ok(profile)
}

pub async fn open_session(
    db_path: &Path,
    profile_name: Option<&str>,
    mode: ConnectivityMode,
) -> Result<CliSession, CliError> {
    let profile = load_profile(profile_name)?;
    open_session_with_profile(db_path, profile, mode).await
}

pub async fn open_session_with_profile(
    db_path: &Path,
    profile: CliProfile,
    mode: ConnectivityMode,
) -> Result<CliSession, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut store = LibSqlRecordStore::open(db_path).await?;
    if let Some(quota) = profile.quota_bytes {
        store = store.with_quota(quota);
    }

    let api_base_url = profile.api_base_url();
    let registry = build_registry(api_base_url.as_deref(), &profile)?;
    let probe = api_base_url
        .as_deref()
        .map(HttpConnectivityProbe::new)
        .transpose()?;

    let online = match (&probe, mode) {
        (Some(probe), ConnectivityMode::Probe) => probe.probe().await,
        _ => false,
    };
    if mode == ConnectivityMode::Probe && probe.is_some() && !online {
        tracing::warn!("API is unreachable; operations stay queued");
    }

    let service = OfflineService::builder(Arc::new(store), Arc::new(registry))
        .monitor(ConnectivityMonitor::new(online))
        .config(profile.engine.clone())
        .start()
        .await?;

    Ok(CliSession {
        service,
        profile,
        probe,
    })
}

fn build_registry(
    api_base_url: Option<&str>,
    profile: &CliProfile,
) -> Result<EndpointRegistry, CliError> {
    let mut registry = EndpointRegistry::new();
    let Some(base_url) = api_base_url else {
        return Ok(registry);
    };

    let client = reqwest::Client::builder()
        .timeout(profile.engine.request_timeout())
        .build()?;
    let token = CliProfile::api_token();
    for entity_type in profile.entity_types().map_err(CliError::Config)? {
        let endpoint = HttpEntityEndpoint::for_entity(base_url, &entity_type, client.clone())?
            .with_bearer_token(token.clone());
        registry.register(entity_type, Arc::new(endpoint));
    }
    Ok(registry)
}

pub fn operation_status(operation: &Operation) -> &'static str {
    if operation.synced {
        "synced"
    } else if operation.is_dead_lettered() {
        "dead-letter"
    } else {
        "pending"
    }
}

pub fn format_operation_lines(operations: &[Operation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    operations
        .iter()
        .map(|operation| {
            let id = operation.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let target = format!("{} {}", operation.action, operation.entity_type);
            let preview = payload_preview(&operation.payload, PREVIEW_CHARS);
            let relative_time = format_relative_time(operation.created_at, now_ms);
            let status = operation_status(operation);

            match &operation.last_error {
                Some(error) if !operation.synced => format!(
                    "{short_id:<13}  {target:<20}  {status:<11}  {relative_time:<8}  {preview}  [{error}]"
                ),
                _ => format!(
                    "{short_id:<13}  {target:<20}  {status:<11}  {relative_time:<8}  {preview}"
                ),
            }
        })
        .collect()
}

pub fn operation_to_list_item(operation: &Operation) -> OperationListItem {
    let now_ms = Utc::now().timestamp_millis();
    OperationListItem {
        id: operation.id.to_string(),
        entity_type: operation.entity_type.to_string(),
        action: operation.action.to_string(),
        status: operation_status(operation).to_string(),
        attempts: operation.attempts,
        last_error: operation.last_error.clone(),
        created_at: operation.created_at,
        relative_time: format_relative_time(operation.created_at, now_ms),
        payload: operation.payload.clone(),
    }
}

pub fn print_operations(
    operations: &[Operation],
    as_json: bool,
    empty_message: &str,
) -> Result<(), CliError> {
    if as_json {
        let items = operations
            .iter()
            .map(operation_to_list_item)
            .collect::<Vec<OperationListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }
    for line in format_operation_lines(operations) {
        println!("{line}");
    }
    Ok(())
}

pub fn payload_preview(payload: &Value, max_chars: usize) -> String {
    let compact = payload.to_string();
    if compact.chars().count() <= max_chars {
        compact
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = compact.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

/// Parse a payload argument, falling back to piped stdin
pub fn resolve_payload(payload: Option<&str>) -> Result<Value, CliError> {
    if let Some(raw) = payload {
        return parse_payload(raw);
    }
    match read_piped_stdin()? {
        Some(raw) => parse_payload(&raw),
        None => Err(CliError::EmptyPayload),
    }
}

pub fn parse_payload(raw: &str) -> Result<Value, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyPayload);
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|error| CliError::InvalidPayload(error.to_string()))?;
    if !value.is_object() {
        return Err(CliError::InvalidPayload(format!(
            "expected an object, got {}",
            json_kind(&value)
        )));
    }
    Ok(value)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn parse_operation_id(raw: &str) -> Result<OperationId, CliError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<OperationId>()
        .map_err(|_| CliError::InvalidOperationId(trimmed.to_string()))
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("FIELDSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("fieldsync")
        .join("fieldsync.db")
}

pub const fn probe_interval(seconds: u64) -> Duration {
    if seconds == 0 {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(seconds)
    }
}
