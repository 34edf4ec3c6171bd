use std::path::Path;

use fieldsync_core::StorageInfo;

use crate::commands::common::{open_session, ConnectivityMode};
use crate::error::CliError;

pub async fn run_storage(as_json: bool, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile, ConnectivityMode::Offline).await?;
    let info = session.service.get_storage_info().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", format_storage_info(&info));
    }
    Ok(())
}

pub fn format_storage_info(info: &StorageInfo) -> String {
    if info.quota == 0 {
        "No storage quota configured".to_string()
    } else {
        format!(
            "{} of {} bytes used ({:.2}%)",
            info.used, info.quota, info.percentage
        )
    }
}
