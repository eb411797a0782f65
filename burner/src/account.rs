//! Live signing capability bound to one account.

use std::sync::Arc;

use alloy::primitives::{Address, B256, Signature};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;

use crate::error::{BurnerError, LedgerResult, Result};
use crate::keys::{self, BurnerKeys};
use crate::ledger::Ledger;

/// An account that can sign for its address on a ledger.
///
/// Burners get one on demand from the manager; the master account that
/// funds them is an `Account` too. Holds no state shared with the store.
#[derive(Clone)]
pub struct Account {
    address: Address,
    signer: PrivateKeySigner,
    ledger: Arc<dyn Ledger>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Bind `private_key` to the account contract at `address`.
    pub fn new(ledger: Arc<dyn Ledger>, address: Address, private_key: B256) -> Result<Self> {
        let signer = PrivateKeySigner::from_bytes(&private_key)
            .map_err(|e| BurnerError::invalid_key(e.to_string()))?;
        Ok(Self {
            address,
            signer,
            ledger,
        })
    }

    /// An account whose address is the signer's own externally owned address.
    #[must_use]
    pub fn from_signer(ledger: Arc<dyn Ledger>, signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
            ledger,
        }
    }

    /// Parse a hex private key (with or without `0x`) into an externally
    /// owned account.
    pub fn from_private_key_hex(ledger: Arc<dyn Ledger>, key: &str) -> Result<Self> {
        let key = key.strip_prefix("0x").unwrap_or(key);
        let signer = key
            .parse::<PrivateKeySigner>()
            .map_err(|e| BurnerError::invalid_key(e.to_string()))?;
        Ok(Self::from_signer(ledger, signer))
    }

    pub(crate) fn from_keys(ledger: Arc<dyn Ledger>, keys: &BurnerKeys) -> Result<Self> {
        Self::new(ledger, keys.address(), keys.private_key())
    }

    /// The account address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The account public key (x-coordinate).
    #[must_use]
    pub fn public_key(&self) -> B256 {
        keys::public_key_of(&self.signer)
    }

    /// The ledger the account is bound to.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Sign a 32-byte hash with the account key.
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| BurnerError::Signing(e.to_string()))
    }

    /// Current on-chain nonce of the account.
    pub async fn nonce(&self) -> LedgerResult<u64> {
        self.ledger.nonce(self.address).await
    }
}
