//! Burner - disposable on-chain signing accounts.
//!
//! A burner is a locally generated keypair whose account contract address is
//! derived before deployment. The manager funds it from a master account,
//! submits its self-deployment, persists its key and keeps track of which
//! burner is the active one across restarts.
//!
//! # Architecture
//!
//! - **Keys** ([`keys`]) - Keypair generation and address derivation
//! - **Store** ([`store`]) - Burner records over a [`storage`] backend
//! - **Funding** ([`funding`]) - Prefund transfer from the master account
//! - **Deploy** ([`deploy`]) - Account self-deployment
//! - **Manager** ([`manager`]) - Create, select and restore lifecycle
//! - **Ledger** ([`ledger`]) - Chain client capability and in-memory devnet
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use burner::prelude::*;
//!
//! let manager = BurnerManager::builder()
//!     .ledger(ledger)
//!     .storage(Arc::new(FileStorage::new("~/.burner")))
//!     .master(master)
//!     .build()?;
//!
//! if let Err(e) = manager.restore_active_on_startup().await {
//!     if !e.is_recoverable() {
//!         return Err(e);
//!     }
//! }
//! let burner = manager.create().await?;
//! ```

pub mod account;
pub mod config;
pub mod connector;
pub mod deploy;
pub mod error;
pub mod funding;
pub mod keys;
pub mod ledger;
pub mod manager;
pub mod storage;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::account::Account;
    pub use crate::config::BurnerConfig;
    pub use crate::connector::BurnerConnector;
    pub use crate::deploy::DeploymentOrchestrator;
    pub use crate::error::{
        BurnerError, ConfigError, ConfigResult, DeploymentError, FundingError, LedgerError,
        LedgerResult, Result, StoreError, StoreResult,
    };
    pub use crate::funding::FundingOrchestrator;
    pub use crate::keys::{BurnerKeys, ClassHash, KeyPairFactory};
    pub use crate::ledger::{
        DeploymentPayload, Invocation, Ledger, LedgerEvent, MemoryLedger, PollOptions, Receipt,
        TxStatus,
    };
    pub use crate::manager::{BurnerManager, BurnerManagerBuilder, OrphanedBurner};
    pub use crate::storage::{FileStorage, KeyValueStore, MemoryStorage};
    pub use crate::store::{AccountStore, BurnerEntry, BurnerRecord, BurnerSet};
}

pub use error::{BurnerError, Result};
pub use manager::BurnerManager;
