//! Unified error types for burner account management.
//!
//! Every lifecycle operation reports a [`BurnerError`]. Errors raised by the
//! collaborators (ledger, persistence, configuration) and by the two chain
//! orchestrators have their own enums and convert into it.

use std::time::Duration;

use alloy::primitives::{Address, TxHash};

use crate::ledger::TxStatus;
use crate::manager::OrphanedBurner;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for burner lifecycle operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BurnerError {
    /// The burner could not be funded by the master account.
    ///
    /// Nothing was persisted and no deployment was attempted.
    #[error("funding failed: {0}")]
    FundingFailed(#[from] FundingError),

    /// The deployment transaction was rejected at submission.
    ///
    /// The funding transfer already went through; the generated keys travel
    /// with the error in `orphan` so the caller can retry the deployment.
    #[error("deployment of burner {address} failed: {source}")]
    DeploymentFailed {
        /// Address of the funded but undeployed burner.
        address: Address,
        /// Why the deployment was rejected.
        source: DeploymentError,
        /// In-memory keys of the funded burner. Never persisted.
        orphan: Box<OrphanedBurner>,
    },

    /// The deployment was submitted but the burner could not be stored.
    ///
    /// The account is funded and deployed on chain. Its keys and deployment
    /// hash travel with the error in `orphan`; hand it to
    /// [`BurnerManager::resume_deployment`](crate::manager::BurnerManager::resume_deployment)
    /// to store it without deploying again.
    #[error("burner {address} deployed but not stored: {source}")]
    PersistFailed {
        /// Address of the deployed burner.
        address: Address,
        /// Why the store write failed.
        source: StoreError,
        /// In-memory keys of the deployed burner.
        orphan: Box<OrphanedBurner>,
    },

    /// No burner with this address exists in the store.
    #[error("burner not found: {0}")]
    BurnerNotFound(Address),

    /// The chain no longer knows the persisted burners; the store was cleared.
    #[error("burners not deployed, chain may have restarted ({discarded} discarded)")]
    StaleChainState {
        /// Number of records removed from the store.
        discarded: usize,
    },

    /// Persistence read or write failure.
    #[error("storage: {0}")]
    Io(#[from] StoreError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Stored or supplied key material is not a valid secp256k1 scalar.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The signer refused to sign.
    #[error("signing: {0}")]
    Signing(String),

}

impl BurnerError {
    /// Create an invalid key error.
    #[inline]
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Whether the error was already recovered from internally.
    ///
    /// Only [`BurnerError::StaleChainState`] qualifies: the store has been
    /// reset and the manager is usable for new burners.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::StaleChainState { .. })
    }

    /// The orphaned burner carried by a deployment or persistence failure.
    #[must_use]
    pub fn into_orphan(self) -> Option<OrphanedBurner> {
        match self {
            Self::DeploymentFailed { orphan, .. } | Self::PersistFailed { orphan, .. } => {
                Some(*orphan)
            }
            _ => None,
        }
    }
}

/// Result type alias for burner operations.
pub type Result<T> = std::result::Result<T, BurnerError>;

// ============================================================================
// Orchestrator Errors
// ============================================================================

/// Error type for the funding transfer.
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    /// No master account was configured or supplied.
    #[error("master account not found")]
    MissingMaster,

    /// The ledger refused the funding transaction.
    #[error("transfer rejected: {0}")]
    Rejected(#[source] LedgerError),

    /// The transfer was submitted but never reached an accepted state.
    #[error("transfer not accepted: {0}")]
    NotAccepted(#[source] LedgerError),
}

/// Error type for the account deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    /// The burner could not sign its own deployment payload.
    #[error("signing: {0}")]
    Signing(String),

    /// The ledger refused the deployment transaction.
    #[error("rejected: {0}")]
    Rejected(#[source] LedgerError),
}

// ============================================================================
// Ledger Errors
// ============================================================================

/// Error type for ledger client operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No contract is deployed at the address.
    #[error("contract not found: {0}")]
    ContractNotFound(Address),

    /// The ledger rejected a submission.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The transaction reached a terminal state that is not accepted.
    #[error("transaction {tx} ended as {status}")]
    Failed {
        /// Transaction hash.
        tx: TxHash,
        /// The terminal status observed.
        status: TxStatus,
    },

    /// The transaction was not accepted within the polling bound.
    #[error("transaction {tx} not accepted after {waited:?}")]
    Timeout {
        /// Transaction hash.
        tx: TxHash,
        /// How long the poller waited.
        waited: Duration,
    },

    /// The ledger could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Create a rejection error.
    #[inline]
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

// ============================================================================
// Storage Errors
// ============================================================================

/// Error type for persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for persistence operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Tests
// ============================================================================
