use std::path::Path;

use fieldsync_core::models::SkipReason;
use fieldsync_core::{SyncReport, SyncTrigger};

use crate::commands::common::{format_sync_timestamp, open_session, ConnectivityMode};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile, ConnectivityMode::Probe).await?;
    session.require_sync()?;

    let report = session.service.run_sync(SyncTrigger::Manual).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_sync_report(&report) {
        println!("{line}");
    }
    if let Some(last_sync) = session.service.last_sync().await? {
        println!("Last sync: {}", format_sync_timestamp(last_sync));
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    if let Some(reason) = report.skipped {
        return vec![format!("Sync skipped: {}", skip_reason_label(reason))];
    }

    let mut lines = vec![format!(
        "Synced {} of {} operation(s)",
        report.succeeded, report.attempted
    )];
    let retrying = report.failed().saturating_sub(report.dead_lettered);
    if retrying > 0 {
        lines.push(format!("{retrying} will be retried on the next sync"));
    }
    if report.dead_lettered > 0 {
        lines.push(format!(
            "{} rejected; see `fieldsync dead-letters`",
            report.dead_lettered
        ));
    }
    lines
}

const fn skip_reason_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Offline => "API unreachable",
        SkipReason::AlreadyRunning => "another sync is running",
    }
}
