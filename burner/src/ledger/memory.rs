//! In-process devnet implementing [`Ledger`].
//!
//! Keeps native token balances, account nonces, declared classes and
//! receipts in memory. Receipts report `RECEIVED` for a configurable number
//! of queries before settling, so callers exercise their polling path.
//! [`MemoryLedger::reset`] wipes everything, like restarting a local chain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::{Address, B256, Signature, TxHash, U256, address, keccak256};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{DeploymentPayload, Invocation, Ledger, Receipt, TxStatus};
use crate::account::Account;
use crate::error::{LedgerError, LedgerResult};
use crate::keys::{self, ClassHash};

/// A submission accepted by the devnet, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// Native token transfer.
    Transfer {
        /// Transaction hash.
        tx: TxHash,
        /// Sender.
        from: Address,
        /// Recipient.
        to: Address,
        /// Amount moved.
        amount: U256,
    },
    /// Account deployment.
    Deployment {
        /// Transaction hash.
        tx: TxHash,
        /// Deployed address.
        address: Address,
        /// Final status the deployment settles to.
        outcome: TxStatus,
    },
}

#[derive(Debug)]
struct TrackedTx {
    outcome: TxStatus,
    polls_left: u32,
    block_number: u64,
}

#[derive(Debug, Default)]
struct Chain {
    balances: HashMap<Address, U256>,
    /// Deployed accounts and their next nonce.
    nonces: HashMap<Address, u64>,
    classes: HashSet<ClassHash>,
    txs: HashMap<TxHash, TrackedTx>,
    events: Vec<LedgerEvent>,
    block: u64,
}

impl Chain {
    fn track(&mut self, tx: TxHash, outcome: TxStatus, polls: u32) {
        self.block += 1;
        self.txs.insert(
            tx,
            TrackedTx {
                outcome,
                polls_left: polls,
                block_number: self.block,
            },
        );
    }
}

/// In-memory devnet ledger.
#[derive(Debug)]
pub struct MemoryLedger {
    chain: Mutex<Chain>,
    native_token: Address,
    confirmation_polls: u32,
    reject_transfers: AtomicBool,
    reject_deployments: AtomicBool,
    available: AtomicBool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Address of the devnet native token contract.
    pub const NATIVE_TOKEN: Address = address!("49d36570d4e46f48e99674bd3fcc84644ddd6b96");

    /// Create an empty devnet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Chain::default()),
            native_token: Self::NATIVE_TOKEN,
            confirmation_polls: 1,
            reject_transfers: AtomicBool::new(false),
            reject_deployments: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }

    /// Number of receipt queries answered with `RECEIVED` before a
    /// transaction settles.
    #[must_use]
    pub const fn with_confirmation_polls(mut self, polls: u32) -> Self {
        self.confirmation_polls = polls;
        self
    }

    /// The native token contract address.
    #[must_use]
    pub const fn native_token(&self) -> Address {
        self.native_token
    }

    /// Register an account class so it can be deployed.
    pub async fn declare_class(&self, class_hash: ClassHash) {
        self.chain.lock().await.classes.insert(class_hash);
    }

    /// Credit `amount` to `address` out of thin air and mark it deployed.
    ///
    /// Used to set up master accounts.
    pub async fn mint(&self, address: Address, amount: U256) {
        let mut chain = self.chain.lock().await;
        *chain.balances.entry(address).or_default() += amount;
        chain.nonces.entry(address).or_insert(0);
    }

    /// Native token balance of `address`.
    pub async fn balance_of(&self, address: Address) -> U256 {
        self.chain
            .lock()
            .await
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// Whether an account is deployed at `address`.
    pub async fn is_deployed(&self, address: Address) -> bool {
        self.chain.lock().await.nonces.contains_key(&address)
    }

    /// Every accepted submission so far.
    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.chain.lock().await.events.clone()
    }

    /// Forget all state, as if the chain had restarted from genesis.
    pub async fn reset(&self) {
        *self.chain.lock().await = Chain::default();
        debug!("devnet reset");
    }

    /// Make every call fail with [`LedgerError::Unavailable`] while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Reject every transfer submission while `true`.
    pub fn reject_transfers(&self, reject: bool) {
        self.reject_transfers.store(reject, Ordering::SeqCst);
    }

    /// Reject every deployment submission while `true`.
    pub fn reject_deployments(&self, reject: bool) {
        self.reject_deployments.store(reject, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> LedgerResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("devnet is down".into()))
        }
    }
}

fn verify(signature: &Signature, hash: &B256, public_key: B256) -> LedgerResult<()> {
    let key = signature
        .recover_from_prehash(hash)
        .map_err(|e| LedgerError::rejected(format!("invalid signature: {e}")))?;
    let x = B256::from_slice(&key.to_encoded_point(true).as_bytes()[1..]);
    if x == public_key {
        Ok(())
    } else {
        Err(LedgerError::rejected("signature does not match account key"))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn nonce(&self, address: Address) -> LedgerResult<u64> {
        self.ensure_available()?;
        self.chain
            .lock()
            .await
            .nonces
            .get(&address)
            .copied()
            .ok_or(LedgerError::ContractNotFound(address))
    }

    async fn submit_transfer(
        &self,
        sender: &Account,
        call: &Invocation,
        nonce: u64,
    ) -> LedgerResult<TxHash> {
        self.ensure_available()?;
        if self.reject_transfers.load(Ordering::SeqCst) {
            return Err(LedgerError::rejected("transfers are disabled"));
        }
        if call.contract != self.native_token {
            return Err(LedgerError::rejected(format!("no contract at {}", call.contract)));
        }
        if call.entrypoint != "transfer" {
            return Err(LedgerError::rejected(format!(
                "unknown entrypoint '{}'",
                call.entrypoint
            )));
        }
        let [to, amount, high] = call.calldata.as_slice() else {
            return Err(LedgerError::rejected("transfer expects 3 arguments"));
        };
        if !high.is_zero() {
            return Err(LedgerError::rejected("amount exceeds 128 bits"));
        }
        let to = Address::from_word(B256::from(*to));
        let amount = *amount;

        let from = sender.address();
        let hash = call.signing_hash(from, nonce);
        let signature = sender
            .sign_hash(&hash)
            .map_err(|e| LedgerError::rejected(e.to_string()))?;
        verify(&signature, &hash, sender.public_key())?;

        let mut chain = self.chain.lock().await;
        let expected = chain
            .nonces
            .get(&from)
            .copied()
            .ok_or(LedgerError::ContractNotFound(from))?;
        if nonce != expected {
            return Err(LedgerError::rejected(format!(
                "invalid nonce {nonce}, expected {expected}"
            )));
        }
        let balance = chain.balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(LedgerError::rejected("insufficient balance"));
        }

        chain.balances.insert(from, balance - amount);
        *chain.balances.entry(to).or_default() += amount;
        chain.nonces.insert(from, expected + 1);

        let tx = hash;
        chain.track(tx, TxStatus::AcceptedOnL2, self.confirmation_polls);
        chain.events.push(LedgerEvent::Transfer {
            tx,
            from,
            to,
            amount,
        });
        debug!(%tx, %from, %to, %amount, "devnet transfer");
        Ok(tx)
    }

    async fn submit_deployment(
        &self,
        payload: &DeploymentPayload,
        nonce: u64,
    ) -> LedgerResult<TxHash> {
        self.ensure_available()?;
        if self.reject_deployments.load(Ordering::SeqCst) {
            return Err(LedgerError::rejected("deployments are disabled"));
        }
        let signature = payload
            .signature
            .as_ref()
            .ok_or_else(|| LedgerError::rejected("deployment is not signed"))?;
        let [public_key] = payload.constructor_calldata.as_slice() else {
            return Err(LedgerError::rejected("account constructor expects 1 argument"));
        };
        let signing_hash = payload.signing_hash();
        verify(signature, &signing_hash, *public_key)?;

        let derived = keys::contract_address(
            payload.address_salt,
            payload.class_hash,
            &payload.constructor_calldata,
        );
        if derived != payload.contract_address {
            return Err(LedgerError::rejected("contract address does not match payload"));
        }
        let address = payload.contract_address;

        let mut chain = self.chain.lock().await;
        if !chain.classes.contains(&payload.class_hash) {
            return Err(LedgerError::rejected(format!(
                "class {} is not declared",
                payload.class_hash
            )));
        }
        if chain.nonces.contains_key(&address) {
            return Err(LedgerError::rejected("account already deployed"));
        }
        if nonce != 0 {
            return Err(LedgerError::rejected(format!("invalid nonce {nonce}, expected 0")));
        }

        // Unfunded deployments are accepted for inclusion and revert on execution.
        let funded = chain.balances.get(&address).is_some_and(|b| !b.is_zero());
        let outcome = if funded {
            chain.nonces.insert(address, 1);
            TxStatus::AcceptedOnL2
        } else {
            TxStatus::Reverted
        };

        let mut preimage = signing_hash.to_vec();
        preimage.extend_from_slice(&chain.block.to_be_bytes());
        let tx = keccak256(&preimage);
        chain.track(tx, outcome, self.confirmation_polls);
        chain.events.push(LedgerEvent::Deployment {
            tx,
            address,
            outcome,
        });
        debug!(%tx, %address, %outcome, "devnet deployment");
        Ok(tx)
    }

    async fn receipt(&self, tx: TxHash) -> LedgerResult<Option<Receipt>> {
        self.ensure_available()?;
        let mut chain = self.chain.lock().await;
        let Some(tracked) = chain.txs.get_mut(&tx) else {
            return Ok(None);
        };
        let status = if tracked.polls_left > 0 {
            tracked.polls_left -= 1;
            TxStatus::Received
        } else {
            tracked.outcome
        };
        Ok(Some(Receipt {
            tx_hash: tx,
            status,
            block_number: (status != TxStatus::Received).then_some(tracked.block_number),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy::signers::local::PrivateKeySigner;

    use super::*;
    use crate::keys::KeyPairFactory;
    use crate::ledger::PollOptions;

    const CLASS: ClassHash = B256::repeat_byte(0xc1);

    fn fast_poll() -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(2),
            timeout: Duration::from_millis(500),
            ..PollOptions::default()
        }
    }

    async fn funded_master(ledger: &Arc<MemoryLedger>) -> Account {
        let master = Account::from_signer(ledger.clone(), PrivateKeySigner::random());
        ledger.mint(master.address(), U256::from(1_000_000u64)).await;
        master
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_and_bumps_nonce() {
        let ledger = Arc::new(MemoryLedger::new());
        let master = funded_master(&ledger).await;
        let to = Address::repeat_byte(7);

        let call = Invocation::transfer(ledger.native_token(), to, U256::from(400u64));
        let tx = ledger.submit_transfer(&master, &call, 0).await.unwrap();

        assert_eq!(ledger.balance_of(to).await, U256::from(400u64));
        assert_eq!(ledger.balance_of(master.address()).await, U256::from(999_600u64));
        assert_eq!(ledger.nonce(master.address()).await.unwrap(), 1);

        let first = ledger.receipt(tx).await.unwrap().unwrap();
        assert_eq!(first.status, TxStatus::Received);
        assert_eq!(first.block_number, None);
        let second = ledger.receipt(tx).await.unwrap().unwrap();
        assert_eq!(second.status, TxStatus::AcceptedOnL2);
        assert!(second.block_number.is_some());
    }

    #[tokio::test]
    async fn test_transfer_rejections() {
        let ledger = Arc::new(MemoryLedger::new());
        let master = funded_master(&ledger).await;
        let to = Address::repeat_byte(7);

        let wrong_token = Invocation::transfer(Address::repeat_byte(1), to, U256::from(1u64));
        let err = ledger.submit_transfer(&master, &wrong_token, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        let call = Invocation::transfer(ledger.native_token(), to, U256::from(1u64));
        let err = ledger.submit_transfer(&master, &call, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        let too_much = Invocation::transfer(ledger.native_token(), to, U256::from(2_000_000u64));
        let err = ledger.submit_transfer(&master, &too_much, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        assert!(ledger.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sender_has_no_nonce() {
        let ledger = Arc::new(MemoryLedger::new());
        let err = ledger.nonce(Address::repeat_byte(3)).await.unwrap_err();
        assert_eq!(err, LedgerError::ContractNotFound(Address::repeat_byte(3)));
    }

    #[tokio::test]
    async fn test_unfunded_deployment_reverts() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.declare_class(CLASS).await;
        let keys = KeyPairFactory::new(CLASS).generate();
        let burner = Account::from_keys(ledger.clone(), &keys).unwrap();

        let mut payload = DeploymentPayload::new(CLASS, keys.public_key());
        payload.signature = Some(burner.sign_hash(&payload.signing_hash()).unwrap());
        let tx = ledger.submit_deployment(&payload, 0).await.unwrap();

        let err = ledger.wait_for_acceptance(tx, &fast_poll()).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Failed {
                tx,
                status: TxStatus::Reverted
            }
        );
        assert!(!ledger.is_deployed(keys.address()).await);
    }

    #[tokio::test]
    async fn test_deployment_checks_class_and_signature() {
        let ledger = Arc::new(MemoryLedger::new());
        let keys = KeyPairFactory::new(CLASS).generate();
        let burner = Account::from_keys(ledger.clone(), &keys).unwrap();

        let unsigned = DeploymentPayload::new(CLASS, keys.public_key());
        let err = ledger.submit_deployment(&unsigned, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        let mut payload = unsigned.clone();
        payload.signature = Some(burner.sign_hash(&payload.signing_hash()).unwrap());
        let err = ledger.submit_deployment(&payload, 0).await.unwrap_err();
        assert!(err.to_string().contains("not declared"));

        ledger.declare_class(CLASS).await;
        let mut forged = payload.clone();
        forged.signature = Some(burner.sign_hash(&B256::repeat_byte(1)).unwrap());
        let err = ledger.submit_deployment(&forged, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_funded_deployment_is_accepted() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.declare_class(CLASS).await;
        let master = funded_master(&ledger).await;
        let keys = KeyPairFactory::new(CLASS).generate();
        let call = Invocation::transfer(ledger.native_token(), keys.address(), U256::from(10u64));
        ledger.submit_transfer(&master, &call, 0).await.unwrap();
        let burner = Account::from_keys(ledger.clone(), &keys).unwrap();

        let mut payload = DeploymentPayload::new(CLASS, keys.public_key());
        payload.signature = Some(burner.sign_hash(&payload.signing_hash()).unwrap());
        let tx = ledger.submit_deployment(&payload, 0).await.unwrap();

        let receipt = ledger.wait_for_acceptance(tx, &fast_poll()).await.unwrap();
        assert_eq!(receipt.status, TxStatus::AcceptedOnL2);
        assert!(ledger.is_deployed(keys.address()).await);
        assert_eq!(burner.nonce().await.unwrap(), 1);

        let err = ledger.submit_deployment(&payload, 0).await.unwrap_err();
        assert!(err.to_string().contains("already deployed"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let ledger = Arc::new(MemoryLedger::new().with_confirmation_polls(u32::MAX));
        let master = funded_master(&ledger).await;
        let call = Invocation::transfer(ledger.native_token(), Address::repeat_byte(7), U256::from(1u64));
        let tx = ledger.submit_transfer(&master, &call, 0).await.unwrap();

        let options = PollOptions {
            interval: Duration::from_millis(2),
            timeout: Duration::from_millis(30),
            ..PollOptions::default()
        };
        let err = ledger.wait_for_acceptance(tx, &options).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_wait_with_zero_interval() {
        let ledger = Arc::new(MemoryLedger::new());
        let master = funded_master(&ledger).await;
        let call = Invocation::transfer(ledger.native_token(), Address::repeat_byte(7), U256::from(1u64));
        let tx = ledger.submit_transfer(&master, &call, 0).await.unwrap();

        let options = PollOptions {
            interval: Duration::ZERO,
            ..fast_poll()
        };
        let receipt = ledger.wait_for_acceptance(tx, &options).await.unwrap();
        assert_eq!(receipt.status, TxStatus::AcceptedOnL2);
    }

    #[tokio::test]
    async fn test_wait_survives_brief_outage() {
        let ledger = Arc::new(MemoryLedger::new());
        let master = funded_master(&ledger).await;
        let call = Invocation::transfer(ledger.native_token(), Address::repeat_byte(7), U256::from(1u64));
        let tx = ledger.submit_transfer(&master, &call, 0).await.unwrap();

        ledger.set_available(false);
        let waiter = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.wait_for_acceptance(tx, &fast_poll()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ledger.set_available(true);

        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.status, TxStatus::AcceptedOnL2);
    }

    #[tokio::test]
    async fn test_reset_forgets_everything() {
        let ledger = Arc::new(MemoryLedger::new());
        let master = funded_master(&ledger).await;
        let call = Invocation::transfer(ledger.native_token(), Address::repeat_byte(7), U256::from(1u64));
        let tx = ledger.submit_transfer(&master, &call, 0).await.unwrap();

        ledger.reset().await;
        assert_eq!(ledger.receipt(tx).await.unwrap(), None);
        assert_eq!(ledger.balance_of(master.address()).await, U256::ZERO);
        assert!(ledger.events().await.is_empty());
    }
}
