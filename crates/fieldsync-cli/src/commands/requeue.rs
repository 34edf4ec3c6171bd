use std::path::Path;

use crate::commands::common::{open_session, parse_operation_id, ConnectivityMode};
use crate::error::CliError;

pub async fn run_requeue(id: &str, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;

    if !session.service.requeue(&id).await? {
        return Err(CliError::NotDeadLettered(id.to_string()));
    }
    println!("Requeued {id}");
    Ok(())
}
