//! Burner key generation and deterministic contract address derivation.
//!
//! A burner is a secp256k1 keypair whose account contract address is known
//! before anything touches the chain. The address is derived CREATE2-style
//! from the account class, the constructor calldata and the public key used
//! as the address salt, with the zero address as deployer:
//!
//! ```text
//! address = create2(deployer = 0x0, salt = public_key,
//!                   keccak256(class_hash ‖ calldata[0] ‖ … ‖ calldata[n]))
//! ```
//!
//! Everything here is offline and free of side effects.

use alloy::primitives::{Address, B256, keccak256};
use alloy::signers::local::PrivateKeySigner;

use crate::error::{BurnerError, Result};

/// Identifier of a pre-registered account contract class.
pub type ClassHash = B256;

/// Deployer used in address derivation. Account deployments are self-deployed.
pub const DEPLOYER: Address = Address::ZERO;

/// Public key of a signer: the x-coordinate of its secp256k1 point.
#[must_use]
pub fn public_key_of(signer: &PrivateKeySigner) -> B256 {
    let point = signer.credential().verifying_key().to_encoded_point(true);
    // Compressed SEC1: one parity byte followed by the 32-byte x-coordinate.
    B256::from_slice(&point.as_bytes()[1..])
}

/// Constructor calldata of the account contract for `public_key`.
#[must_use]
pub fn constructor_calldata(public_key: B256) -> Vec<B256> {
    vec![public_key]
}

/// Derive the contract address of an account.
///
/// Pure function of its inputs: the same public key, class and calldata
/// always produce the same address.
#[must_use]
pub fn contract_address(public_key: B256, class_hash: ClassHash, calldata: &[B256]) -> Address {
    let mut preimage = Vec::with_capacity(32 * (calldata.len() + 1));
    preimage.extend_from_slice(class_hash.as_slice());
    for word in calldata {
        preimage.extend_from_slice(word.as_slice());
    }
    DEPLOYER.create2(public_key.0, keccak256(&preimage).0)
}

/// Freshly generated burner key material and its derived address.
#[derive(Clone, PartialEq, Eq)]
pub struct BurnerKeys {
    private_key: B256,
    public_key: B256,
    address: Address,
    class_hash: ClassHash,
}

impl std::fmt::Debug for BurnerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnerKeys")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("class_hash", &self.class_hash)
            .finish_non_exhaustive()
    }
}

impl BurnerKeys {
    /// Rebuild key material from an existing private key.
    pub fn from_private_key(private_key: B256, class_hash: ClassHash) -> Result<Self> {
        let signer = PrivateKeySigner::from_bytes(&private_key)
            .map_err(|e| BurnerError::invalid_key(e.to_string()))?;
        Ok(Self::from_signer(&signer, class_hash))
    }

    fn from_signer(signer: &PrivateKeySigner, class_hash: ClassHash) -> Self {
        let public_key = public_key_of(signer);
        let calldata = constructor_calldata(public_key);
        Self {
            private_key: signer.to_bytes(),
            public_key,
            address: contract_address(public_key, class_hash, &calldata),
            class_hash,
        }
    }

    /// The derived account contract address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The public key (x-coordinate).
    #[must_use]
    pub const fn public_key(&self) -> B256 {
        self.public_key
    }

    /// The account class the address was derived for.
    #[must_use]
    pub const fn class_hash(&self) -> ClassHash {
        self.class_hash
    }

    /// Raw private key. Only for persistence and signer reconstruction.
    pub(crate) const fn private_key(&self) -> B256 {
        self.private_key
    }
}

/// Generates burner keypairs for one account class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPairFactory {
    class_hash: ClassHash,
}

impl KeyPairFactory {
    /// Create a factory deriving addresses for `class_hash`.
    #[must_use]
    pub const fn new(class_hash: ClassHash) -> Self {
        Self { class_hash }
    }

    /// The account class this factory derives addresses for.
    #[must_use]
    pub const fn class_hash(&self) -> ClassHash {
        self.class_hash
    }

    /// Generate a fresh keypair from the OS random source.
    #[must_use]
    pub fn generate(&self) -> BurnerKeys {
        let signer = PrivateKeySigner::random();
        BurnerKeys::from_signer(&signer, self.class_hash)
    }
}
