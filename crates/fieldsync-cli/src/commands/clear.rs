use std::path::Path;

use crate::commands::common::{open_session, ConnectivityMode};
use crate::error::CliError;

pub async fn run_clear(confirmed: bool, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;

    let unsynced =
        session.service.pending_count().await? + session.service.dead_letters().await?.len();
    if unsynced > 0 && !confirmed {
        return Err(CliError::ConfirmationRequired(unsynced));
    }

    session.service.clear_offline_data().await?;
    println!("Offline data cleared");
    Ok(())
}
