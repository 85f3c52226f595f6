//! Network policy checks run before each action, album and upload.

use std::sync::Arc;

use crate::error::{SyncError, SyncResult};

/// Reports the current network type.
pub trait ConnectivityPolicy: Send + Sync {
    fn is_metered(&self) -> bool;
}

/// Always unmetered, for desktop hosts and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl ConnectivityPolicy for Unmetered {
    fn is_metered(&self) -> bool {
        false
    }
}

/// Applies the account's Wi-Fi-only setting to a [`ConnectivityPolicy`].
#[derive(Clone)]
pub struct ConnectivityGuard {
    policy: Arc<dyn ConnectivityPolicy>,
    wifi_only: bool,
}

impl ConnectivityGuard {
    pub fn new(policy: Arc<dyn ConnectivityPolicy>, wifi_only: bool) -> Self {
        ConnectivityGuard { policy, wifi_only }
    }

    /// Fails with [`SyncError::ConnectivityPolicy`] on a metered network
    /// while sync is restricted to Wi-Fi.
    pub fn check(&self) -> SyncResult<()> {
        if self.wifi_only && self.policy.is_metered() {
            return Err(SyncError::ConnectivityPolicy);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectivityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityGuard")
            .field("wifi_only", &self.wifi_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Metered;

    impl ConnectivityPolicy for Metered {
        fn is_metered(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_metered_only_blocks_when_wifi_only() {
        assert!(matches!(
            ConnectivityGuard::new(Arc::new(Metered), true).check(),
            Err(SyncError::ConnectivityPolicy)
        ));
        assert!(ConnectivityGuard::new(Arc::new(Metered), false).check().is_ok());
        assert!(ConnectivityGuard::new(Arc::new(Unmetered), true).check().is_ok());
    }
}
