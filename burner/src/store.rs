//! Durable burner records.
//!
//! All records live in one [`BurnerSet`], serialized as a single JSON blob
//! under one logical key. Every mutation rewrites the whole blob.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::{Address, B256, TxHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::keys::BurnerKeys;
use crate::storage::KeyValueStore;

/// Default storage key of the burner set.
pub const DEFAULT_STORAGE_KEY: &str = "burners";

/// One generated, funded and deploy-submitted burner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnerRecord {
    /// Derived account contract address.
    pub address: Address,
    private_key: B256,
    /// Public key (x-coordinate).
    pub public_key: B256,
    /// Hash of the deployment transaction.
    pub deploy_tx: TxHash,
    /// Whether this is the selected burner.
    pub active: bool,
}

impl std::fmt::Debug for BurnerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnerRecord")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("deploy_tx", &self.deploy_tx)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl BurnerRecord {
    /// Record for `keys` whose deployment was submitted as `deploy_tx`.
    #[must_use]
    pub const fn new(keys: &BurnerKeys, deploy_tx: TxHash) -> Self {
        Self {
            address: keys.address(),
            private_key: keys.private_key(),
            public_key: keys.public_key(),
            deploy_tx,
            active: false,
        }
    }

    pub(crate) const fn private_key(&self) -> B256 {
        self.private_key
    }
}

/// Address and selection state of a burner, as listed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnerEntry {
    /// Burner address.
    pub address: Address,
    /// Whether it is the selected burner.
    pub active: bool,
}

/// Insertion-ordered set of burner records keyed by address.
///
/// At most one record is active once any selecting operation has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BurnerSet {
    records: Vec<BurnerRecord>,
}

impl BurnerSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Number of records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set has no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BurnerRecord> {
        self.records.iter()
    }

    /// The oldest record.
    #[must_use]
    pub fn first(&self) -> Option<&BurnerRecord> {
        self.records.first()
    }

    /// Look up a record by address.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&BurnerRecord> {
        self.records.iter().find(|r| &r.address == address)
    }

    /// Whether a record with this address exists.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// The active record, if any.
    #[must_use]
    pub fn active(&self) -> Option<&BurnerRecord> {
        self.records.iter().find(|r| r.active)
    }

    /// Insert a record, replacing any record with the same address in place.
    pub fn insert(&mut self, record: BurnerRecord) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.address == record.address) {
            *existing = record;
        } else {
            self.records.push(record);
        }
    }

    /// Insert a record as the only active one.
    pub fn insert_active(&mut self, mut record: BurnerRecord) {
        self.deactivate_all();
        record.active = true;
        self.insert(record);
    }

    /// Make `address` the only active record.
    ///
    /// Returns `false` and leaves the set untouched if `address` is absent.
    pub fn activate(&mut self, address: &Address) -> bool {
        if !self.contains(address) {
            return false;
        }
        for record in &mut self.records {
            record.active = &record.address == address;
        }
        true
    }

    /// Clear the active flag on every record.
    pub fn deactivate_all(&mut self) {
        for record in &mut self.records {
            record.active = false;
        }
    }

    /// Address and selection state of every record, in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<BurnerEntry> {
        self.records
            .iter()
            .map(|r| BurnerEntry {
                address: r.address,
                active: r.active,
            })
            .collect()
    }

    /// Keep only the first record of each address. Returns how many were dropped.
    fn dedup_addresses(&mut self) -> usize {
        let before = self.records.len();
        let mut seen = HashSet::with_capacity(before);
        self.records.retain(|r| seen.insert(r.address));
        before - self.records.len()
    }

    /// Keep only the first active flag. Returns how many flags were cleared.
    fn repair_active(&mut self) -> usize {
        let mut seen = false;
        let mut cleared = 0;
        for record in &mut self.records {
            if record.active {
                if seen {
                    record.active = false;
                    cleared += 1;
                }
                seen = true;
            }
        }
        cleared
    }
}

/// Persists the [`BurnerSet`] through a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct AccountStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
}

impl AccountStore {
    /// Create a store writing under `key`.
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// The logical storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load every record. Nothing persisted yet yields an empty set.
    pub async fn load_all(&self) -> StoreResult<BurnerSet> {
        let Some(blob) = self.storage.get(&self.key).await? else {
            return Ok(BurnerSet::new());
        };
        let mut set: BurnerSet = serde_json::from_slice(&blob)?;
        let dropped = set.dedup_addresses();
        if dropped > 0 {
            warn!(key = %self.key, dropped, "stored burners had duplicate addresses");
        }
        let cleared = set.repair_active();
        if cleared > 0 {
            warn!(key = %self.key, cleared, "stored burners had several active flags");
        }
        Ok(set)
    }

    /// Overwrite the persisted set.
    pub async fn save_all(&self, set: &BurnerSet) -> StoreResult<()> {
        let blob = serde_json::to_vec_pretty(set)?;
        self.storage.set(&self.key, &blob).await?;
        debug!(key = %self.key, records = set.len(), "saved burners");
        Ok(())
    }

    /// Remove all persisted state.
    pub async fn clear(&self) -> StoreResult<()> {
        self.storage.remove(&self.key).await?;
        debug!(key = %self.key, "cleared burners");
        Ok(())
    }
}
