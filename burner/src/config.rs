//! Burner manager configuration.
//!
//! Loaded from a JSON file; every field has a default so partial files are
//! fine. A few fields can be overridden from the environment.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::{Address, U256, b256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::keys::ClassHash;
use crate::ledger::{MemoryLedger, PollOptions, TxStatus};
use crate::store::DEFAULT_STORAGE_KEY;

/// Default amount transferred from the master to every new burner.
pub const DEFAULT_PREFUND_AMOUNT: U256 = U256::from_limbs([0x0003_8D7E_A4C6_8000, 0, 0, 0]);

/// Default account contract class.
pub const DEFAULT_ACCOUNT_CLASS_HASH: ClassHash =
    b256!("05400e90f7e0ae78bd02c77cd75527280470e2fe19c54970dd79dc37a9d3645c");

/// Environment variable overriding [`BurnerConfig::funding_contract`].
pub const ENV_FUNDING_CONTRACT: &str = "BURNER_FUNDING_CONTRACT";
/// Environment variable overriding [`BurnerConfig::account_class_hash`].
pub const ENV_ACCOUNT_CLASS_HASH: &str = "BURNER_ACCOUNT_CLASS_HASH";
/// Environment variable overriding [`BurnerConfig::prefund_amount`].
pub const ENV_PREFUND_AMOUNT: &str = "BURNER_PREFUND_AMOUNT";

/// Configuration of a [`BurnerManager`](crate::manager::BurnerManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnerConfig {
    /// Amount sent to each new burner before deployment.
    pub prefund_amount: U256,
    /// Token contract the prefund transfer is made on.
    pub funding_contract: Address,
    /// Account class new burners are deployed as.
    pub account_class_hash: ClassHash,
    /// Delay between receipt queries, in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for the prefund transfer, in seconds.
    pub acceptance_timeout_secs: u64,
    /// Key the burner set is persisted under.
    pub storage_key: String,
    /// Statuses counting as accepted.
    pub accepted_states: Vec<TxStatus>,
}

impl Default for BurnerConfig {
    fn default() -> Self {
        Self {
            prefund_amount: DEFAULT_PREFUND_AMOUNT,
            funding_contract: MemoryLedger::NATIVE_TOKEN,
            account_class_hash: DEFAULT_ACCOUNT_CLASS_HASH,
            poll_interval_ms: 1000,
            acceptance_timeout_secs: 300,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            accepted_states: vec![TxStatus::AcceptedOnL2],
        }
    }
}

impl BurnerConfig {
    /// Load configuration from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Write configuration as pretty JSON, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        if let Some(value) = lookup(ENV_FUNDING_CONTRACT) {
            self.funding_contract = parse_var(ENV_FUNDING_CONTRACT, &value)?;
        }
        if let Some(value) = lookup(ENV_ACCOUNT_CLASS_HASH) {
            self.account_class_hash = parse_var(ENV_ACCOUNT_CLASS_HASH, &value)?;
        }
        if let Some(value) = lookup(ENV_PREFUND_AMOUNT) {
            self.prefund_amount = parse_var(ENV_PREFUND_AMOUNT, &value)?;
        }
        Ok(self)
    }

    /// Check the configuration for values the manager cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms must be non-zero"));
        }
        if self.acceptance_timeout().as_millis() < u128::from(self.poll_interval_ms) {
            return Err(ConfigError::invalid(
                "acceptance_timeout_secs must not be shorter than poll_interval_ms",
            ));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::invalid("storage_key must not be empty"));
        }
        if self.accepted_states.is_empty() {
            return Err(ConfigError::invalid("accepted_states must not be empty"));
        }
        if let Some(status) = self.accepted_states.iter().find(|s| s.is_failure()) {
            return Err(ConfigError::invalid(format!(
                "accepted_states contains failure status {status}"
            )));
        }
        if self.prefund_amount.is_zero() {
            return Err(ConfigError::invalid("prefund_amount must be non-zero"));
        }
        Ok(())
    }

    /// Delay between receipt queries.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on waiting for acceptance.
    #[must_use]
    pub const fn acceptance_timeout(&self) -> Duration {
        Duration::from_secs(self.acceptance_timeout_secs)
    }

    /// Polling options for the prefund transfer.
    #[must_use]
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: self.poll_interval(),
            timeout: self.acceptance_timeout(),
            accepted: self.accepted_states.clone(),
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use tokio_test::assert_ok;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = BurnerConfig::default();
        assert_eq!(config.prefund_amount, U256::from(0x0003_8D7E_A4C6_8000_u64));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.storage_key, "burners");
        assert_eq!(config.accepted_states, vec![TxStatus::AcceptedOnL2]);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BurnerConfig = serde_json::from_str(r#"{"poll_interval_ms": 50}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.storage_key, "burners");
        assert_eq!(config.prefund_amount, DEFAULT_PREFUND_AMOUNT);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            BurnerConfig {
                poll_interval_ms: 0,
                ..Default::default()
            },
            BurnerConfig {
                poll_interval_ms: 5_000,
                acceptance_timeout_secs: 1,
                ..Default::default()
            },
            BurnerConfig {
                storage_key: "  ".into(),
                ..Default::default()
            },
            BurnerConfig {
                accepted_states: vec![],
                ..Default::default()
            },
            BurnerConfig {
                accepted_states: vec![TxStatus::AcceptedOnL2, TxStatus::Reverted],
                ..Default::default()
            },
            BurnerConfig {
                prefund_amount: U256::ZERO,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_overrides() {
        let config = BurnerConfig::default()
            .with_overrides(|name| match name {
                ENV_PREFUND_AMOUNT => Some("0x10".into()),
                ENV_FUNDING_CONTRACT => Some(format!("{}", Address::repeat_byte(0xaa))),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.prefund_amount, U256::from(16u64));
        assert_eq!(config.funding_contract, Address::repeat_byte(0xaa));
        assert_eq!(config.account_class_hash, DEFAULT_ACCOUNT_CLASS_HASH);

        let err = BurnerConfig::default()
            .with_overrides(|name| (name == ENV_ACCOUNT_CLASS_HASH).then(|| "zz".into()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_ACCOUNT_CLASS_HASH));
    }

    #[test]
    fn test_poll_options() {
        let config = BurnerConfig {
            poll_interval_ms: 10,
            acceptance_timeout_secs: 2,
            ..Default::default()
        };
        let options = config.poll_options();
        assert_eq!(options.interval, Duration::from_millis(10));
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert!(options.accepts(TxStatus::AcceptedOnL2));
        assert!(!options.accepts(TxStatus::AcceptedOnL1));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = BurnerConfig {
            storage_key: "devnet-burners".into(),
            ..Default::default()
        };

        config.save(&path).await.unwrap();
        assert_eq!(BurnerConfig::load(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = BurnerConfig::load(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
