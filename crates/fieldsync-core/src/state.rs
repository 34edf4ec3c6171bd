//! Shared sync status type.

use serde::Serialize;

/// Sync status shown by client status indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    /// Offline wins over everything; a running pass wins over the last result.
    pub const fn resolve(online: bool, syncing: bool, last_pass_failed: bool) -> Self {
        match (online, syncing, last_pass_failed) {
            (false, _, _) => Self::Offline,
            (true, true, _) => Self::Syncing,
            (true, false, true) => Self::Error,
            (true, false, false) => Self::Synced,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prioritizes_offline_then_syncing() {
        assert_eq!(SyncState::resolve(false, true, true), SyncState::Offline);
        assert_eq!(SyncState::resolve(true, true, true), SyncState::Syncing);
        assert_eq!(SyncState::resolve(true, false, true), SyncState::Error);
        assert_eq!(SyncState::resolve(true, false, false), SyncState::Synced);
    }
}
