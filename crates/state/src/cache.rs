//! Bounded read-through caches for persisted state.
//!
//! Finalized states drop their contract-state and artifact payloads from
//! memory; the store reloads entries through these caches on demand.
//! Eviction is size-bounded LRU under a single mutex per cache.

use crate::account::Account;
use crate::contract::Module;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tessera_types::{AccountAddress, ModuleRef};

/// Default bound of the account cache.
pub const DEFAULT_ACCOUNTS_CACHE_SIZE: usize = 10_000;

/// Default bound of the module cache.
pub const DEFAULT_MODULES_CACHE_SIZE: usize = 1_000;

/// Shared caches for accounts and module metadata.
#[derive(Debug)]
pub struct StateCaches {
    accounts: Mutex<LruCache<AccountAddress, Arc<Account>>>,
    modules: Mutex<LruCache<ModuleRef, Arc<Module>>>,
}

impl StateCaches {
    /// Create caches with explicit bounds. Zero bounds fall back to the
    /// defaults.
    pub fn new(accounts_size: usize, modules_size: usize) -> Self {
        let accounts = NonZeroUsize::new(accounts_size)
            .unwrap_or(NonZeroUsize::new(DEFAULT_ACCOUNTS_CACHE_SIZE).unwrap());
        let modules = NonZeroUsize::new(modules_size)
            .unwrap_or(NonZeroUsize::new(DEFAULT_MODULES_CACHE_SIZE).unwrap());
        StateCaches {
            accounts: Mutex::new(LruCache::new(accounts)),
            modules: Mutex::new(LruCache::new(modules)),
        }
    }

    /// Look up an account, falling back to `load` on a miss and caching the
    /// result.
    pub fn account_or_load<F>(
        &self,
        address: &AccountAddress,
        load: F,
    ) -> Option<Arc<Account>>
    where
        F: FnOnce() -> Option<Arc<Account>>,
    {
        if let Some(hit) = self.accounts.lock().get(address) {
            return Some(hit.clone());
        }
        let loaded = load()?;
        self.accounts.lock().put(*address, loaded.clone());
        Some(loaded)
    }

    /// Look up a module, falling back to `load` on a miss.
    pub fn module_or_load<F>(&self, module_ref: &ModuleRef, load: F) -> Option<Arc<Module>>
    where
        F: FnOnce() -> Option<Arc<Module>>,
    {
        if let Some(hit) = self.modules.lock().get(module_ref) {
            return Some(hit.clone());
        }
        let loaded = load()?;
        self.modules.lock().put(*module_ref, loaded.clone());
        Some(loaded)
    }

    /// Drop everything (startup recovery resets caches).
    pub fn clear(&self) {
        self.accounts.lock().clear();
        self.modules.lock().clear();
    }

    /// Current entry counts (accounts, modules).
    pub fn len(&self) -> (usize, usize) {
        (self.accounts.lock().len(), self.modules.lock().len())
    }
}

impl Default for StateCaches {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNTS_CACHE_SIZE, DEFAULT_MODULES_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{test_address, test_keypair};
    use tessera_types::{Amount, Nonce};

    fn account(seed: u8) -> Arc<Account> {
        Arc::new(Account {
            address: test_address(seed),
            index: seed as u64,
            balance: Amount(100),
            next_nonce: Nonce::FIRST,
            verify_key: test_keypair(seed).public(),
            credentials: vec![],
            release_schedule: vec![],
            encrypted_balance: Amount::ZERO,
            baker: None,
            delegation: None,
        })
    }

    #[test]
    fn loads_once_then_hits() {
        let caches = StateCaches::new(4, 4);
        let mut loads = 0;
        for _ in 0..3 {
            let got = caches.account_or_load(&test_address(1), || {
                loads += 1;
                Some(account(1))
            });
            assert!(got.is_some());
        }
        assert_eq!(loads, 1);
    }

    #[test]
    fn eviction_is_bounded() {
        let caches = StateCaches::new(2, 2);
        for seed in 0..5u8 {
            caches.account_or_load(&test_address(seed), || Some(account(seed)));
        }
        assert_eq!(caches.len().0, 2);
    }

    #[test]
    fn miss_with_failing_loader_stays_uncached() {
        let caches = StateCaches::new(2, 2);
        assert!(caches
            .account_or_load(&test_address(1), || None)
            .is_none());
        assert_eq!(caches.len().0, 0);
    }
}
