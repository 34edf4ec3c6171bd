use fieldsync_core::models::{ItemOutcome, SessionItem, SkipReason};
use fieldsync_core::{Action, EntityType, OperationId, StorageInfo, SyncReport};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

use crate::cli::{ActionArg, CompletionShell};
use crate::commands::common::{
    format_operation_lines, format_relative_time, format_sync_timestamp,
    open_session_with_profile, operation_status, operation_to_list_item, parse_operation_id,
    parse_payload, payload_preview, ConnectivityMode,
};
use crate::commands::completions::render_completions;
use crate::commands::config::{apply_overrides, ProfileOverrides};
use crate::commands::storage::format_storage_info;
use crate::commands::sync::format_sync_report;
use crate::config_profiles::CliProfile;
use crate::error::CliError;

#[test]
fn parse_payload_accepts_objects_only() {
    assert_eq!(
        parse_payload(r#" {"title": "Roof"} "#).unwrap(),
        json!({"title": "Roof"})
    );
    assert!(matches!(parse_payload("  "), Err(CliError::EmptyPayload)));
    assert!(matches!(
        parse_payload("[1, 2]"),
        Err(CliError::InvalidPayload(message)) if message.contains("an array")
    ));
    assert!(matches!(
        parse_payload("{not json"),
        Err(CliError::InvalidPayload(_))
    ));
}

#[test]
fn parse_operation_id_rejects_garbage() {
    let id = OperationId::new();
    assert_eq!(parse_operation_id(&format!(" {id} ")).unwrap(), id);
    assert!(matches!(
        parse_operation_id("not-an-id"),
        Err(CliError::InvalidOperationId(value)) if value == "not-an-id"
    ));
}

#[test]
fn action_arg_maps_to_core_action() {
    assert_eq!(Action::from(ActionArg::Create), Action::Create);
    assert_eq!(Action::from(ActionArg::Update), Action::Update);
    assert_eq!(Action::from(ActionArg::Delete), Action::Delete);
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_sync_timestamp_uses_utc() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn payload_preview_truncates_long_payloads() {
    let payload = json!({"notes": "x".repeat(100)});
    let preview = payload_preview(&payload, 20);
    assert_eq!(preview.chars().count(), 20);
    assert!(preview.ends_with("..."));
    assert_eq!(payload_preview(&json!({"a": 1}), 20), r#"{"a":1}"#);
}

#[test]
fn operation_listing_shows_status_and_error() {
    let mut operation = fieldsync_core::Operation::new(
        EntityType::inspection(),
        Action::Update,
        json!({"id": "42"}),
        0,
    );
    operation.last_error = Some("HTTP 503".to_string());
    assert_eq!(operation_status(&operation), "pending");

    let lines = format_operation_lines(std::slice::from_ref(&operation));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("update inspection"));
    assert!(lines[0].contains("[HTTP 503]"));

    operation.dead_lettered_at = Some(1);
    let item = operation_to_list_item(&operation);
    assert_eq!(item.status, "dead-letter");
    assert_eq!(item.entity_type, "inspection");
    assert_eq!(item.payload, json!({"id": "42"}));
}

#[test]
fn format_sync_report_summarizes_outcomes() {
    assert_eq!(
        format_sync_report(&SyncReport::skipped(SkipReason::Offline)),
        vec!["Sync skipped: API unreachable".to_string()]
    );

    let report = SyncReport {
        attempted: 3,
        succeeded: 1,
        dead_lettered: 1,
        skipped: None,
        items: vec![SessionItem {
            id: OperationId::new(),
            outcome: ItemOutcome::Succeeded,
        }],
    };
    assert_eq!(
        format_sync_report(&report),
        vec![
            "Synced 1 of 3 operation(s)".to_string(),
            "1 will be retried on the next sync".to_string(),
            "1 rejected; see `fieldsync dead-letters`".to_string(),
        ]
    );
}

#[test]
fn format_storage_info_handles_missing_quota() {
    assert_eq!(
        format_storage_info(&StorageInfo::default()),
        "No storage quota configured"
    );
    let info = StorageInfo {
        used: 250,
        quota: 1_000,
        percentage: 25.0,
    };
    assert_eq!(format_storage_info(&info), "250 of 1000 bytes used (25.00%)");
}

#[test]
fn apply_overrides_updates_profile_and_engine() {
    let mut profile = CliProfile::default();
    apply_overrides(
        &mut profile,
        ProfileOverrides {
            api_base_url: Some("https://api.example.com/v1/".to_string()),
            quota_bytes: Some(10_000),
            entities: vec!["inspection".to_string()],
            engine_json: None,
            settle_delay_ms: Some(250),
            request_timeout_ms: None,
            retention_days: Some(3),
        },
    )
    .unwrap();

    assert_eq!(
        profile.api_base_url.as_deref(),
        Some("https://api.example.com/v1")
    );
    assert_eq!(profile.quota_bytes, Some(10_000));
    assert_eq!(profile.engine.settle_delay_ms, 250);
    assert_eq!(profile.engine.request_timeout_ms, 30_000);
    assert_eq!(profile.engine.retention_secs, 3 * 24 * 60 * 60);
    assert!(profile.validate().is_ok());
}

#[test]
fn apply_overrides_reads_engine_json_before_flags() {
    let mut profile = CliProfile::default();
    apply_overrides(
        &mut profile,
        ProfileOverrides {
            engine_json: Some(r#"{ "settle_delay_ms": 500, "request_timeout_ms": 5000 }"#.to_string()),
            settle_delay_ms: Some(250),
            ..ProfileOverrides::default()
        },
    )
    .unwrap();

    assert_eq!(profile.engine.settle_delay_ms, 250);
    assert_eq!(profile.engine.request_timeout_ms, 5_000);
    assert_eq!(profile.engine.retention_secs, 7 * 24 * 60 * 60);
}

#[test]
fn apply_overrides_rejects_invalid_engine_json() {
    let mut profile = CliProfile::default();
    let result = apply_overrides(
        &mut profile,
        ProfileOverrides {
            engine_json: Some(r#"{ "request_timeout_ms": 0 }"#.to_string()),
            ..ProfileOverrides::default()
        },
    );
    assert!(matches!(result, Err(CliError::Config(message)) if message.contains("request_timeout_ms")));
    assert_eq!(profile.engine.request_timeout_ms, 30_000);
}

#[test]
fn apply_overrides_rejects_url_without_scheme() {
    let mut profile = CliProfile::default();
    let result = apply_overrides(
        &mut profile,
        ProfileOverrides {
            api_base_url: Some("api.example.com".to_string()),
            ..ProfileOverrides::default()
        },
    );
    assert!(matches!(result, Err(CliError::Config(_))));
    assert_eq!(profile.api_base_url, None);
}

#[test]
fn completions_mention_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("fieldsync"));
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_session_queues_without_api() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("nested").join("fieldsync.db");

    let session = open_session_with_profile(&db_path, CliProfile::default(), ConnectivityMode::Offline)
        .await
        .unwrap();
    assert!(!session.service.is_app_online());

    let id = session
        .service
        .store_offline_data(EntityType::template(), Action::Create, json!({"name": "Roof"}))
        .await
        .unwrap();
    let pending = session.service.get_pending_sync_items().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert!(db_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn session_applies_profile_quota() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("fieldsync.db");
    let profile = CliProfile {
        quota_bytes: Some(100_000),
        ..CliProfile::default()
    };

    let session = open_session_with_profile(&db_path, profile, ConnectivityMode::Offline)
        .await
        .unwrap();
    session
        .service
        .store_offline_data(EntityType::user(), Action::Create, json!({"name": "Ana"}))
        .await
        .unwrap();

    let info = session.service.get_storage_info().await.unwrap();
    assert_eq!(info.quota, 100_000);
    assert!(info.used > 0);
}
