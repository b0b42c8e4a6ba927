//! Sync state as shown in the UI's connectivity badge.

/// All states the background sync can report.
///
/// The badge displays the human-readable label returned by
/// `SyncIndicator::label()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncIndicator {
    /// No pass has run yet.
    Idle,
    /// A pass is in flight.
    Syncing,
    /// Last pass completed with nothing left failing.
    Synced,
    /// Last pass could not reach the server.
    Offline,
    /// Last pass left failures or could not read the queue.
    Error(String),
}

impl SyncIndicator {
    pub fn label(&self) -> &str {
        match self {
            SyncIndicator::Idle => "Waiting",
            SyncIndicator::Syncing => "Syncing...",
            SyncIndicator::Synced => "Synced",
            SyncIndicator::Offline => "Offline",
            SyncIndicator::Error(_) => "Error",
        }
    }

    /// Whether the last known state implies the server is reachable.
    pub fn is_online(&self) -> bool {
        matches!(self, SyncIndicator::Syncing | SyncIndicator::Synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(SyncIndicator::Idle.label(), "Waiting");
        assert_eq!(SyncIndicator::Syncing.label(), "Syncing...");
        assert_eq!(SyncIndicator::Synced.label(), "Synced");
        assert_eq!(SyncIndicator::Offline.label(), "Offline");
        assert_eq!(SyncIndicator::Error("disk full".into()).label(), "Error");
    }

    #[test]
    fn test_is_online() {
        assert!(!SyncIndicator::Idle.is_online());
        assert!(SyncIndicator::Syncing.is_online());
        assert!(SyncIndicator::Synced.is_online());
        assert!(!SyncIndicator::Offline.is_online());
        assert!(!SyncIndicator::Error("oops".into()).is_online());
    }
}
