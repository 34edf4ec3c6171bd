//! Best-effort registration with the platform's background sync facility

use async_trait::async_trait;
use thiserror::Error;

/// Platform hook that can wake the app to sync while it is not in the foreground
#[async_trait]
pub trait BackgroundSyncRegistrar: Send + Sync {
    /// Ask the platform to deliver a background sync callback for `tag`
    async fn register(&self, tag: &str) -> Result<(), BackgroundSyncError>;
}

#[derive(Debug, Error)]
pub enum BackgroundSyncError {
    #[error("Background sync is not supported on this platform")]
    Unsupported,
    #[error("Background sync registration failed: {0}")]
    Registration(String),
}

/// Register `tag` once. Never fails: foreground sync works either way.
///
/// Returns whether the platform accepted the registration.
pub async fn register_background_sync(
    registrar: Option<&dyn BackgroundSyncRegistrar>,
    tag: &str,
) -> bool {
    let Some(registrar) = registrar else {
        tracing::debug!("No background sync registrar; using foreground sync only");
        return false;
    };

    match registrar.register(tag).await {
        Ok(()) => {
            tracing::info!("Registered background sync tag '{tag}'");
            true
        }
        Err(BackgroundSyncError::Unsupported) => {
            tracing::debug!("Background sync unsupported; using foreground sync only");
            false
        }
        Err(error) => {
            tracing::warn!("{error}; continuing with foreground sync only");
            false
        }
    }
}
