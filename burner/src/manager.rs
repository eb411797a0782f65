//! Burner lifecycle: create, select, restore.
//!
//! A burner moves through `generated → funded → deploy submitted`, and only
//! enters the store once its deployment has been submitted. From then on the
//! store's `active` flag makes it the manager's current account or not.
//!
//! Every load, mutate and save sequence on the store runs under one lock,
//! so concurrent calls on the same manager keep at most one record active.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, TxHash};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::config::BurnerConfig;
use crate::connector::BurnerConnector;
use crate::deploy::DeploymentOrchestrator;
use crate::error::{BurnerError, ConfigError, Result, StoreResult};
use crate::funding::FundingOrchestrator;
use crate::keys::{BurnerKeys, ClassHash, KeyPairFactory};
use crate::ledger::{Ledger, Receipt};
use crate::storage::{KeyValueStore, MemoryStorage};
use crate::store::{AccountStore, BurnerEntry, BurnerRecord};

/// A funded burner that never made it into the store.
///
/// Either its deployment was rejected, or the deployment was submitted and
/// the store write failed afterwards. Lives only in memory; hand it to
/// [`BurnerManager::resume_deployment`] to retry. Dropping it abandons the
/// prefund at an address nobody else holds the key to.
#[derive(Debug, Clone)]
pub struct OrphanedBurner {
    keys: BurnerKeys,
    funding: Receipt,
    deploy_tx: Option<TxHash>,
}

impl OrphanedBurner {
    /// Address holding the stranded prefund.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.keys.address()
    }

    /// Key material of the burner.
    #[must_use]
    pub const fn keys(&self) -> &BurnerKeys {
        &self.keys
    }

    /// Receipt of the accepted prefund transfer.
    #[must_use]
    pub const fn funding_receipt(&self) -> &Receipt {
        &self.funding
    }

    /// Hash of the deployment, if it was already submitted.
    #[must_use]
    pub const fn deploy_tx(&self) -> Option<TxHash> {
        self.deploy_tx
    }
}

/// Builder for a [`BurnerManager`].
///
/// Created by [`BurnerManager::builder`]. A ledger is required; storage
/// defaults to [`MemoryStorage`] and config to [`BurnerConfig::default`].
#[derive(Debug, Default)]
pub struct BurnerManagerBuilder {
    ledger: Option<Arc<dyn Ledger>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    config: Option<BurnerConfig>,
    master: Option<Account>,
}

impl BurnerManagerBuilder {
    /// Set the ledger burners are funded and deployed on.
    #[must_use]
    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set the durable backend the burner set is kept in.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: BurnerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the master account used by [`BurnerManager::create`].
    #[must_use]
    pub fn master(mut self, master: Account) -> Self {
        self.master = Some(master);
        self
    }

    /// Build the manager, validating the configuration.
    pub fn build(self) -> Result<BurnerManager> {
        let ledger = self
            .ledger
            .ok_or_else(|| ConfigError::invalid("ledger is required"))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        Ok(BurnerManager {
            store: AccountStore::new(storage, config.storage_key.clone()),
            funding: FundingOrchestrator::new(
                ledger.clone(),
                config.funding_contract,
                config.poll_options(),
            ),
            deployer: DeploymentOrchestrator::new(ledger.clone()),
            ledger,
            master: self.master,
            config,
            current: RwLock::new(None),
            store_lock: Mutex::new(()),
            deploying: AtomicUsize::new(0),
        })
    }
}

/// Owns the burner set and the current burner account.
pub struct BurnerManager {
    ledger: Arc<dyn Ledger>,
    store: AccountStore,
    config: BurnerConfig,
    master: Option<Account>,
    funding: FundingOrchestrator,
    deployer: DeploymentOrchestrator,
    current: RwLock<Option<Account>>,
    store_lock: Mutex<()>,
    deploying: AtomicUsize,
}

impl std::fmt::Debug for BurnerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnerManager")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("master", &self.master)
            .field("deploying", &self.deploying.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Counts one in-flight creation for as long as it lives.
struct DeployingGuard<'a>(&'a AtomicUsize);

impl<'a> DeployingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for DeployingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BurnerManager {
    /// Start building a manager.
    #[must_use]
    pub fn builder() -> BurnerManagerBuilder {
        BurnerManagerBuilder::default()
    }

    /// The manager configuration.
    #[must_use]
    pub const fn config(&self) -> &BurnerConfig {
        &self.config
    }

    /// The configured master account.
    #[must_use]
    pub const fn master(&self) -> Option<&Account> {
        self.master.as_ref()
    }

    /// The current burner account, if one is selected.
    pub async fn current(&self) -> Option<Account> {
        self.current.read().await.clone()
    }

    /// Whether any [`create`](Self::create) or
    /// [`resume_deployment`](Self::resume_deployment) is in flight.
    #[must_use]
    pub fn is_deploying(&self) -> bool {
        self.deploying.load(Ordering::SeqCst) > 0
    }

    /// Create a burner with the configured master account and class.
    pub async fn create(&self) -> Result<Account> {
        self.create_with(self.master.as_ref(), self.config.account_class_hash)
            .await
    }

    /// Create, fund and deploy a new burner, then make it the active one.
    ///
    /// Deployment is only attempted once the prefund transfer is accepted,
    /// and nothing is persisted unless the deployment was submitted. A
    /// deployment failure hands back the funded keys in
    /// [`BurnerError::DeploymentFailed`].
    pub async fn create_with(&self, master: Option<&Account>, class_hash: ClassHash) -> Result<Account> {
        let _deploying = DeployingGuard::enter(&self.deploying);

        let keys = KeyPairFactory::new(class_hash).generate();
        let address = keys.address();
        debug!(%address, %class_hash, "generated burner");

        let funding = self
            .funding
            .fund(master, address, self.config.prefund_amount)
            .await
            .inspect_err(|e| warn!(%address, error = %e, "burner funding failed"))?;

        self.deploy_and_persist(OrphanedBurner {
            keys,
            funding,
            deploy_tx: None,
        })
        .await
    }

    /// Finish a burner handed back by a failed [`create`](Self::create).
    ///
    /// The deployment is retried unless it was already submitted, then the
    /// burner is persisted and activated exactly as `create` would.
    pub async fn resume_deployment(&self, orphan: OrphanedBurner) -> Result<Account> {
        let _deploying = DeployingGuard::enter(&self.deploying);
        info!(address = %orphan.address(), "resuming burner deployment");
        self.deploy_and_persist(orphan).await
    }

    async fn deploy_and_persist(&self, mut orphan: OrphanedBurner) -> Result<Account> {
        let address = orphan.address();
        let account = Account::from_keys(self.ledger.clone(), &orphan.keys)?;

        let deploy_tx = if let Some(tx) = orphan.deploy_tx {
            debug!(%address, %tx, "deployment already submitted");
            tx
        } else {
            match self
                .deployer
                .deploy(&account, orphan.keys.class_hash(), orphan.keys.public_key())
                .await
            {
                Ok(tx) => tx,
                Err(source) => {
                    warn!(%address, error = %source, "burner deployment failed, prefund stranded");
                    return Err(BurnerError::DeploymentFailed {
                        address,
                        source,
                        orphan: Box::new(orphan),
                    });
                }
            }
        };
        orphan.deploy_tx = Some(deploy_tx);

        if let Err(source) = self.persist_active(&orphan.keys, deploy_tx, &account).await {
            warn!(%address, %deploy_tx, error = %source, "deployed burner could not be stored");
            return Err(BurnerError::PersistFailed {
                address,
                source,
                orphan: Box::new(orphan),
            });
        }

        info!(%address, %deploy_tx, "burner created");
        Ok(account)
    }

    async fn persist_active(
        &self,
        keys: &BurnerKeys,
        deploy_tx: TxHash,
        account: &Account,
    ) -> StoreResult<()> {
        let _store = self.store_lock.lock().await;
        let mut set = self.store.load_all().await?;
        set.insert_active(BurnerRecord::new(keys, deploy_tx));
        self.store.save_all(&set).await?;
        *self.current.write().await = Some(account.clone());
        Ok(())
    }

    /// Make `address` the only active burner and the current account.
    pub async fn select(&self, address: Address) -> Result<Account> {
        let _store = self.store_lock.lock().await;
        let mut set = self.store.load_all().await?;
        let record = set.get(&address).ok_or(BurnerError::BurnerNotFound(address))?;
        let account = self.account_for(record)?;

        set.activate(&address);
        self.store.save_all(&set).await?;
        *self.current.write().await = Some(account.clone());

        info!(%address, "burner selected");
        Ok(account)
    }

    /// Account for a stored burner. Does not change the selection.
    pub async fn get(&self, address: Address) -> Result<Account> {
        let set = self.store.load_all().await?;
        let record = set.get(&address).ok_or(BurnerError::BurnerNotFound(address))?;
        self.account_for(record)
    }

    /// Every stored burner with its selection state, in creation order.
    pub async fn list(&self) -> Result<Vec<BurnerEntry>> {
        Ok(self.store.load_all().await?.entries())
    }

    /// One connector per stored burner.
    pub async fn connectors(&self) -> Result<Vec<BurnerConnector>> {
        let set = self.store.load_all().await?;
        set.iter()
            .map(|record| Ok(BurnerConnector::new(self.account_for(record)?, record.active)))
            .collect()
    }

    /// Reload the active burner after a restart.
    ///
    /// The oldest stored burner's deployment receipt is used as a probe. If
    /// the ledger no longer knows it, or cannot answer, the chain is assumed
    /// to have been reset: every stored burner is discarded and
    /// [`BurnerError::StaleChainState`] is returned. The manager stays usable
    /// for new burners afterwards.
    ///
    /// Returns the restored account, or `None` when the store is empty or no
    /// burner is active.
    pub async fn restore_active_on_startup(&self) -> Result<Option<Account>> {
        let Some(probe) = self.store.load_all().await?.first().cloned() else {
            debug!("no stored burners to restore");
            return Ok(None);
        };

        let stale = match self.ledger.receipt(probe.deploy_tx).await {
            Ok(Some(receipt)) => {
                debug!(address = %probe.address, status = %receipt.status, "probe deployment found");
                false
            }
            Ok(None) => true,
            Err(e) => {
                debug!(address = %probe.address, error = %e, "probe receipt query failed");
                true
            }
        };

        let _store = self.store_lock.lock().await;
        let set = self.store.load_all().await?;
        let probed = set.first().is_some_and(|r| r.deploy_tx == probe.deploy_tx);

        if stale && probed {
            let discarded = set.len();
            self.store.clear().await?;
            *self.current.write().await = None;
            warn!(discarded, "burners not deployed, chain may have restarted");
            return Err(BurnerError::StaleChainState { discarded });
        }
        if stale {
            debug!(address = %probe.address, "store changed during probe, keeping burners");
        }

        let restored = set.active().map(|r| self.account_for(r)).transpose()?;
        if let Some(account) = &restored {
            info!(address = %account.address(), "restored active burner");
        }
        *self.current.write().await = restored.clone();
        Ok(restored)
    }

    fn account_for(&self, record: &BurnerRecord) -> Result<Account> {
        Account::new(self.ledger.clone(), record.address, record.private_key())
    }
}
