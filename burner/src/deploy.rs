//! Self-deployment of burner account contracts.

use std::sync::Arc;

use alloy::primitives::{B256, TxHash};
use tracing::{debug, info};

use crate::account::Account;
use crate::error::DeploymentError;
use crate::keys::ClassHash;
use crate::ledger::{DeploymentPayload, Ledger};

/// Submits the deployment of a burner's account contract, signed by the
/// burner itself.
#[derive(Debug, Clone)]
pub struct DeploymentOrchestrator {
    ledger: Arc<dyn Ledger>,
}

impl DeploymentOrchestrator {
    /// Create an orchestrator submitting to `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Submit the deployment and return its transaction hash.
    ///
    /// Does not wait for the deployment to be accepted.
    pub async fn deploy(
        &self,
        signer: &Account,
        class_hash: ClassHash,
        public_key: B256,
    ) -> Result<TxHash, DeploymentError> {
        let mut payload = DeploymentPayload::new(class_hash, public_key);
        let signature = signer
            .sign_hash(&payload.signing_hash())
            .map_err(|e| DeploymentError::Signing(e.to_string()))?;
        payload.signature = Some(signature);

        // An account that does not exist yet has no nonce to read.
        let nonce = match self.ledger.nonce(payload.contract_address).await {
            Ok(nonce) => nonce,
            Err(e) => {
                debug!(address = %payload.contract_address, error = %e, "no nonce yet, using 0");
                0
            }
        };

        let tx = self
            .ledger
            .submit_deployment(&payload, nonce)
            .await
            .map_err(DeploymentError::Rejected)?;
        info!(%tx, address = %payload.contract_address, "deployment submitted");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;
    use alloy::signers::local::PrivateKeySigner;

    use super::*;
    use crate::error::LedgerError;
    use crate::keys::KeyPairFactory;
    use crate::ledger::{LedgerEvent, MemoryLedger, TxStatus};

    const CLASS: ClassHash = B256::repeat_byte(0xc1);

    async fn setup() -> (Arc<MemoryLedger>, DeploymentOrchestrator) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.declare_class(CLASS).await;
        let deployer = DeploymentOrchestrator::new(ledger.clone());
        (ledger, deployer)
    }

    #[tokio::test]
    async fn test_deploy_funded_burner() {
        let (ledger, deployer) = setup().await;
        let master = Account::from_signer(ledger.clone(), PrivateKeySigner::random());
        ledger.mint(master.address(), U256::from(1_000u64)).await;

        let keys = KeyPairFactory::new(CLASS).generate();
        let call = crate::ledger::Invocation::transfer(
            MemoryLedger::NATIVE_TOKEN,
            keys.address(),
            U256::from(100u64),
        );
        ledger.submit_transfer(&master, &call, 0).await.unwrap();

        let burner = Account::from_keys(ledger.clone(), &keys).unwrap();
        let tx = deployer
            .deploy(&burner, CLASS, keys.public_key())
            .await
            .unwrap();

        assert!(ledger.is_deployed(keys.address()).await);
        let events = ledger.events().await;
        assert_eq!(
            events.last(),
            Some(&LedgerEvent::Deployment {
                tx,
                address: keys.address(),
                outcome: TxStatus::AcceptedOnL2,
            })
        );
    }

    #[tokio::test]
    async fn test_deploy_does_not_wait() {
        let slow = Arc::new(MemoryLedger::new().with_confirmation_polls(u32::MAX));
        slow.declare_class(CLASS).await;

        let keys = KeyPairFactory::new(CLASS).generate();
        let burner = Account::from_keys(slow.clone(), &keys).unwrap();
        let tx = DeploymentOrchestrator::new(slow.clone())
            .deploy(&burner, CLASS, keys.public_key())
            .await
            .unwrap();

        let receipt = slow.receipt(tx).await.unwrap().unwrap();
        assert_eq!(receipt.status, TxStatus::Received);
    }

    #[tokio::test]
    async fn test_rejected_deployment() {
        let (ledger, deployer) = setup().await;
        ledger.reject_deployments(true);

        let keys = KeyPairFactory::new(CLASS).generate();
        let burner = Account::from_keys(ledger.clone(), &keys).unwrap();
        let err = deployer
            .deploy(&burner, CLASS, keys.public_key())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::Rejected(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_foreign_signer_is_rejected() {
        let (ledger, deployer) = setup().await;
        let keys = KeyPairFactory::new(CLASS).generate();
        let other = KeyPairFactory::new(CLASS).generate();
        let wrong = Account::from_keys(ledger.clone(), &other).unwrap();

        let err = deployer
            .deploy(&wrong, CLASS, keys.public_key())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::Rejected(_)));
        assert!(ledger.events().await.is_empty());
    }
}
