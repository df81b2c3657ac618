//! Process-wide claim on accounts with an active scan job.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::{AccountId, Error, Result};

/// Registry of accounts that have an active scan job.
///
/// Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct ActiveScans {
    accounts: Arc<Mutex<HashSet<AccountId>>>,
}

impl ActiveScans {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims an account; the claim lasts as long as the returned guard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] if the account is already claimed.
    pub fn claim(&self, account_id: &AccountId) -> Result<ActiveScanGuard> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        if !accounts.insert(account_id.clone()) {
            return Err(Error::AlreadyActive(account_id.clone()));
        }
        debug!(account = %account_id, "Claimed account for scanning");
        Ok(ActiveScanGuard {
            registry: self.clone(),
            account_id: account_id.clone(),
        })
    }

    /// Returns true if the account is claimed.
    #[must_use]
    pub fn is_active(&self, account_id: &AccountId) -> bool {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(account_id)
    }

    fn release(&self, account_id: &AccountId) {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(account_id);
        debug!(account = %account_id, "Released scan claim");
    }
}

/// Releases an account claim when dropped.
#[derive(Debug)]
pub struct ActiveScanGuard {
    registry: ActiveScans,
    account_id: AccountId,
}

impl ActiveScanGuard {
    /// The claimed account.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.account_id
    }
}

impl Drop for ActiveScanGuard {
    fn drop(&mut self) {
        self.registry.release(&self.account_id);
    }
}
