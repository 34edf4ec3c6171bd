use std::path::Path;

use fieldsync_core::{Action, EntityType};

use crate::commands::common::{open_session, resolve_payload, ConnectivityMode};
use crate::error::CliError;

pub async fn run_enqueue(
    entity: &str,
    action: Action,
    payload: Option<&str>,
    sync_now: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let entity_type = EntityType::new(entity)?;
    let payload = resolve_payload(payload)?;

    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;
    let id = session
        .service
        .store_offline_data(entity_type, action, payload)
        .await?;
    println!("{id}");

    if !sync_now {
        return Ok(());
    }

    let probe = session.require_sync()?;
    session.service.shutdown();
    if !probe.probe().await {
        println!("API unreachable; operation queued for the next sync");
        return Ok(());
    }
    session.service.monitor().set_online(true);
    if session.service.sync_data().await? {
        println!("Synced");
    } else {
        println!("Some operations could not be synced; run `fieldsync pending` for details");
    }
    Ok(())
}
