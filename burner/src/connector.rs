//! Wallet-selection view of the stored burners.

use alloy::primitives::Address;

use crate::account::Account;

/// One selectable burner, as offered to a wallet picker.
#[derive(Debug, Clone)]
pub struct BurnerConnector {
    id: String,
    active: bool,
    account: Account,
}

impl BurnerConnector {
    /// Wrap a burner account. The connector id is its checksummed address.
    #[must_use]
    pub fn new(account: Account, active: bool) -> Self {
        Self {
            id: account.address().to_checksum(None),
            active,
            account,
        }
    }

    /// Stable identifier of the connector.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address of the burner behind the connector.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.account.address()
    }

    /// Whether this burner was the active one when the connector was built.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// The signing account.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Consume the connector, returning its account.
    #[must_use]
    pub fn into_account(self) -> Account {
        self.account
    }
}
