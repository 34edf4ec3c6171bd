use std::path::Path;

use fieldsync_core::EntityType;

use crate::commands::common::{open_session, print_operations, ConnectivityMode};
use crate::error::CliError;

pub async fn run_list(
    entity: Option<&str>,
    limit: usize,
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let entity_type = entity.map(EntityType::new).transpose()?;
    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;

    let mut operations = session
        .service
        .get_offline_data(entity_type.as_ref())
        .await?;
    operations.reverse();
    operations.truncate(limit);

    print_operations(&operations, as_json, "No operations stored.")
}

pub async fn run_pending(
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;
    let pending = session.service.get_pending_sync_items().await?;
    print_operations(&pending, as_json, "Nothing waiting to sync.")
}

pub async fn run_dead_letters(
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;
    let parked = session.service.dead_letters().await?;
    print_operations(&parked, as_json, "No rejected operations.")
}
