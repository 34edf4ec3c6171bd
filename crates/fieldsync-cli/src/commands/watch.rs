use std::path::Path;

use fieldsync_core::SyncTrigger;

use crate::commands::common::{open_session, probe_interval, ConnectivityMode};
use crate::commands::sync::format_sync_report;
use crate::error::CliError;

pub async fn run_watch(
    interval_secs: u64,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, ConnectivityMode::Probe).await?;
    let probe = session.require_sync()?.clone();
    let service = session.service;

    let listener = service.add_network_listener(|online| {
        if online {
            println!("API reachable; syncing shortly");
        } else {
            println!("API unreachable; queueing locally");
        }
    });

    println!(
        "Watching {} (Ctrl-C to stop)",
        if service.is_app_online() { "online" } else { "offline" }
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(probe_interval(interval_secs));

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                let online = probe.probe().await;
                let changed = service.monitor().set_online(online);
                // Reconnects are handled by the service; retry leftovers while staying online.
                if online && !changed && service.pending_count().await? > 0 {
                    let report = service.run_sync(SyncTrigger::Manual).await?;
                    for line in format_sync_report(&report) {
                        println!("{line}");
                    }
                }
            }
        }
    }

    listener.unsubscribe();
    service.shutdown();
    println!("Stopped watching");
    Ok(())
}
