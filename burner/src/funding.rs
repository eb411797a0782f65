//! Prefund transfers from the master account.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::FundingError;
use crate::ledger::{Invocation, Ledger, PollOptions, Receipt};

/// Transfers the prefund amount to a burner address and waits for it to be
/// accepted.
#[derive(Debug)]
pub struct FundingOrchestrator {
    ledger: Arc<dyn Ledger>,
    funding_contract: Address,
    poll: PollOptions,
    /// Held from nonce read to submission so concurrent transfers from one
    /// master never reuse a nonce.
    submit: Mutex<()>,
}

impl FundingOrchestrator {
    /// Create an orchestrator transferring on `funding_contract`.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, funding_contract: Address, poll: PollOptions) -> Self {
        Self {
            ledger,
            funding_contract,
            poll,
            submit: Mutex::new(()),
        }
    }

    /// The token contract transfers are made on.
    #[must_use]
    pub const fn funding_contract(&self) -> Address {
        self.funding_contract
    }

    /// Send `amount` from `master` to `target` and wait for acceptance.
    ///
    /// Returns only once the transfer reached one of the accepted statuses.
    /// A missing master fails before anything is submitted.
    pub async fn fund(
        &self,
        master: Option<&Account>,
        target: Address,
        amount: U256,
    ) -> Result<Receipt, FundingError> {
        let master = master.ok_or(FundingError::MissingMaster)?;
        let from = master.address();

        let call = Invocation::transfer(self.funding_contract, target, amount);
        let tx = {
            let _submit = self.submit.lock().await;
            let nonce = self
                .ledger
                .nonce(from)
                .await
                .map_err(FundingError::Rejected)?;
            self.ledger
                .submit_transfer(master, &call, nonce)
                .await
                .map_err(|e| {
                    warn!(%from, %target, error = %e, "prefund transfer rejected");
                    FundingError::Rejected(e)
                })?
        };
        debug!(%tx, %from, %target, %amount, "prefund submitted");

        let receipt = self
            .ledger
            .wait_for_acceptance(tx, &self.poll)
            .await
            .map_err(FundingError::NotAccepted)?;
        info!(%tx, %target, status = %receipt.status, "prefund accepted");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::B256;
    use alloy::signers::local::PrivateKeySigner;

    use super::*;
    use crate::error::LedgerError;
    use crate::ledger::{MemoryLedger, TxStatus};

    fn fast_poll() -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    async fn setup() -> (Arc<MemoryLedger>, Account, FundingOrchestrator) {
        let ledger = Arc::new(MemoryLedger::new());
        let master = Account::from_signer(ledger.clone(), PrivateKeySigner::random());
        ledger.mint(master.address(), U256::from(1_000_000u64)).await;
        let funding = FundingOrchestrator::new(ledger.clone(), MemoryLedger::NATIVE_TOKEN, fast_poll());
        (ledger, master, funding)
    }

    #[tokio::test]
    async fn test_fund_waits_for_acceptance() {
        let (ledger, master, funding) = setup().await;
        let target = Address::repeat_byte(0x11);

        let receipt = funding
            .fund(Some(&master), target, U256::from(500u64))
            .await
            .unwrap();

        assert_eq!(receipt.status, TxStatus::AcceptedOnL2);
        assert_eq!(ledger.balance_of(target).await, U256::from(500u64));
    }

    #[tokio::test]
    async fn test_concurrent_transfers_use_distinct_nonces() {
        let (ledger, master, funding) = setup().await;
        let targets: Vec<_> = (1..=4u8).map(Address::repeat_byte).collect();

        let results = futures::future::join_all(
            targets
                .iter()
                .map(|t| funding.fund(Some(&master), *t, U256::from(10u64))),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(ledger.nonce(master.address()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_missing_master_submits_nothing() {
        let (ledger, _, funding) = setup().await;
        let err = funding
            .fund(None, Address::repeat_byte(0x11), U256::from(1u64))
            .await
            .unwrap_err();

        assert!(matches!(err, FundingError::MissingMaster));
        assert!(ledger.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_transfer() {
        let (ledger, master, funding) = setup().await;
        ledger.reject_transfers(true);

        let err = funding
            .fund(Some(&master), Address::repeat_byte(0x11), U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::Rejected(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_rejected() {
        let (_, master, funding) = setup().await;
        let err = funding
            .fund(Some(&master), Address::repeat_byte(0x11), U256::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_undeployed_master_is_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let master = Account::new(ledger.clone(), Address::repeat_byte(0x22), B256::repeat_byte(3)).unwrap();
        let funding = FundingOrchestrator::new(ledger, MemoryLedger::NATIVE_TOKEN, fast_poll());

        let err = funding
            .fund(Some(&master), Address::repeat_byte(0x11), U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FundingError::Rejected(LedgerError::ContractNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unaccepted_transfer_times_out() {
        let ledger = Arc::new(MemoryLedger::new().with_confirmation_polls(u32::MAX));
        let master = Account::from_signer(ledger.clone(), PrivateKeySigner::random());
        ledger.mint(master.address(), U256::from(10u64)).await;
        let funding = FundingOrchestrator::new(
            ledger,
            MemoryLedger::NATIVE_TOKEN,
            PollOptions {
                interval: Duration::from_millis(5),
                timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let err = funding
            .fund(Some(&master), Address::repeat_byte(0x11), U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FundingError::NotAccepted(LedgerError::Timeout { .. })
        ));
    }
}
