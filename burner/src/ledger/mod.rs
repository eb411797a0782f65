//! Ledger client capability.
//!
//! The lifecycle manager talks to the chain only through the [`Ledger`]
//! trait. Encodings of addresses, amounts and calldata on the wire are the
//! implementation's business; this module fixes the shapes that cross the
//! boundary and provides the bounded acceptance poller shared by every
//! implementation.
//!
//! [`MemoryLedger`] is an in-process devnet implementing the trait.

mod memory;

use std::fmt;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256, Signature, TxHash, U256, keccak256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::account::Account;
use crate::error::{LedgerError, LedgerResult};
use crate::keys::{self, ClassHash};

pub use memory::{LedgerEvent, MemoryLedger};

/// Status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Known to the sequencer, not yet in a block.
    Received,
    /// Included and accepted on the rollup.
    AcceptedOnL2,
    /// Accepted and proven on the settlement layer.
    AcceptedOnL1,
    /// Refused before execution.
    Rejected,
    /// Executed and reverted.
    Reverted,
}

impl TxStatus {
    /// Whether the status ends polling with a failure.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Rejected | Self::Reverted)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::AcceptedOnL2 => "ACCEPTED_ON_L2",
            Self::AcceptedOnL1 => "ACCEPTED_ON_L1",
            Self::Rejected => "REJECTED",
            Self::Reverted => "REVERTED",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receipt of a transaction known to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Current status.
    pub status: TxStatus,
    /// Block the transaction landed in, once it has.
    pub block_number: Option<u64>,
}

/// A contract invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Contract being called.
    pub contract: Address,
    /// Entrypoint name.
    pub entrypoint: String,
    /// Call arguments, one word each.
    pub calldata: Vec<U256>,
}

impl Invocation {
    /// A native token `transfer` of `amount` to `to`.
    ///
    /// The amount is passed as a (low, high) word pair; the high word is
    /// always zero for amounts that fit in 128 bits.
    #[must_use]
    pub fn transfer(token: Address, to: Address, amount: U256) -> Self {
        let low = amount & U256::from(u128::MAX);
        let high = amount >> 128;
        Self {
            contract: token,
            entrypoint: "transfer".to_string(),
            calldata: vec![U256::from_be_slice(to.as_slice()), low, high],
        }
    }

    /// Hash signed by `sender` to authorize the invocation at `nonce`.
    #[must_use]
    pub fn signing_hash(&self, sender: Address, nonce: u64) -> B256 {
        let mut preimage = Vec::with_capacity(20 * 2 + self.entrypoint.len() + 32 * self.calldata.len() + 8);
        preimage.extend_from_slice(sender.as_slice());
        preimage.extend_from_slice(self.contract.as_slice());
        preimage.extend_from_slice(self.entrypoint.as_bytes());
        for word in &self.calldata {
            preimage.extend_from_slice(&word.to_be_bytes::<32>());
        }
        preimage.extend_from_slice(&nonce.to_be_bytes());
        keccak256(&preimage)
    }
}

/// Payload of an account deployment transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPayload {
    /// Account class being instantiated.
    pub class_hash: ClassHash,
    /// Constructor arguments.
    pub constructor_calldata: Vec<B256>,
    /// Address salt; the account public key.
    pub address_salt: B256,
    /// Address the deployment will occupy.
    pub contract_address: Address,
    /// Signature of the account key over [`signing_hash`](Self::signing_hash).
    pub signature: Option<Signature>,
}

impl DeploymentPayload {
    /// Build the unsigned deployment payload for an account public key.
    #[must_use]
    pub fn new(class_hash: ClassHash, public_key: B256) -> Self {
        let constructor_calldata = keys::constructor_calldata(public_key);
        let contract_address = keys::contract_address(public_key, class_hash, &constructor_calldata);
        Self {
            class_hash,
            constructor_calldata,
            address_salt: public_key,
            contract_address,
            signature: None,
        }
    }

    /// Hash the account key signs to authorize its own deployment.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        let mut preimage = Vec::with_capacity(32 * (self.constructor_calldata.len() + 2) + 20);
        preimage.extend_from_slice(self.class_hash.as_slice());
        for word in &self.constructor_calldata {
            preimage.extend_from_slice(word.as_slice());
        }
        preimage.extend_from_slice(self.address_salt.as_slice());
        preimage.extend_from_slice(self.contract_address.as_slice());
        keccak256(&preimage)
    }
}

/// Shortest delay between receipt queries; shorter intervals are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How to wait for a transaction to reach an accepted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between receipt queries, at least [`MIN_POLL_INTERVAL`].
    pub interval: Duration,
    /// Upper bound on the total wait.
    pub timeout: Duration,
    /// Statuses that end the wait successfully.
    pub accepted: Vec<TxStatus>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_secs(300),
            accepted: vec![TxStatus::AcceptedOnL2, TxStatus::AcceptedOnL1],
        }
    }
}

impl PollOptions {
    /// Whether `status` ends the wait successfully.
    #[must_use]
    pub fn accepts(&self, status: TxStatus) -> bool {
        self.accepted.contains(&status)
    }
}

/// Client capability for the chain burners live on.
#[async_trait]
pub trait Ledger: Send + Sync + fmt::Debug {
    /// Current nonce of a deployed account.
    ///
    /// Fails with [`LedgerError::ContractNotFound`] for addresses with no
    /// deployed account.
    async fn nonce(&self, address: Address) -> LedgerResult<u64>;

    /// Submit an invocation signed by `sender` at `nonce`.
    async fn submit_transfer(
        &self,
        sender: &Account,
        call: &Invocation,
        nonce: u64,
    ) -> LedgerResult<TxHash>;

    /// Submit an account deployment at `nonce`.
    async fn submit_deployment(&self, payload: &DeploymentPayload, nonce: u64)
    -> LedgerResult<TxHash>;

    /// Receipt of a transaction, or `None` if the ledger does not know it.
    async fn receipt(&self, tx: TxHash) -> LedgerResult<Option<Receipt>>;

    /// Poll [`receipt`](Self::receipt) until `tx` reaches an accepted state.
    ///
    /// Unknown receipts and transient [`LedgerError::Unavailable`] errors keep
    /// the poller going; a failed terminal status ends it immediately. The
    /// whole wait is bounded by `options.timeout`.
    async fn wait_for_acceptance(&self, tx: TxHash, options: &PollOptions) -> LedgerResult<Receipt> {
        let started = Instant::now();
        let poll = async {
            let mut interval = tokio::time::interval(options.interval.max(MIN_POLL_INTERVAL));
            loop {
                interval.tick().await;
                match self.receipt(tx).await {
                    Ok(Some(receipt)) if options.accepts(receipt.status) => return Ok(receipt),
                    Ok(Some(receipt)) if receipt.status.is_failure() => {
                        return Err(LedgerError::Failed {
                            tx,
                            status: receipt.status,
                        });
                    }
                    Ok(Some(receipt)) => trace!(%tx, status = %receipt.status, "awaiting acceptance"),
                    Ok(None) => trace!(%tx, "receipt not found yet"),
                    Err(LedgerError::Unavailable(reason)) => {
                        debug!(%tx, %reason, "ledger unavailable while polling");
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        tokio::time::timeout(options.timeout, poll)
            .await
            .unwrap_or_else(|_| {
                Err(LedgerError::Timeout {
                    tx,
                    waited: started.elapsed(),
                })
            })
    }
}
