//! # Configuration
//!
//! Typed settings loaded from `user_data/_inputs/json/settings.json`, plus
//! the private-key input file. The `Settings` struct is the single source of
//! truth for route composition, per-module delays and fee caps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Modules the `routes` array may name.
pub const KNOWN_MODULES: &[&str] = &[
    "layerzero-warmup",
    "cex-top-up",
    "stargate",
    "coredao-bridge",
    "testnet-bridge",
    "mute",
    "maverick",
    "syncswap",
    "space_fi",
    "jediswap",
    "myswap",
    "10kswap",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Ordered module names to run end-to-end per account.
    pub routes: Vec<String>,
    /// Max concurrent per-account tasks; `None` runs all accounts at once.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Per-module settings, keyed by module name.
    #[serde(default)]
    pub modules: HashMap<String, ModuleSettings>,
}

fn default_database_url() -> String {
    "sqlite://user_data/wallets.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSettings {
    /// `[min, max]` planned-operation count sampled per account at import.
    #[serde(default = "default_count")]
    pub count: [u32; 2],
    #[serde(default)]
    pub index_group: i64,
    #[serde(default)]
    pub delay: DelaySettings,
    #[serde(default = "default_max_fee_in_usd")]
    pub max_fee_in_usd: f64,
    /// Source-balance acceptance range, in the token's human units.
    #[serde(default)]
    pub min_balance: f64,
    #[serde(default = "default_max_balance")]
    pub max_balance: f64,
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    /// `[min%, max%]` of balance spent when the module uses a percent policy.
    #[serde(default = "default_amount_percent")]
    pub amount_percent: [f64; 2],
}

fn default_count() -> [u32; 2] {
    [1, 1]
}

fn default_max_fee_in_usd() -> f64 {
    1.0
}

fn default_max_balance() -> f64 {
    f64::MAX
}

fn default_slippage() -> f64 {
    0.5
}

fn default_amount_percent() -> [f64; 2] {
    [100.0, 100.0]
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            count: default_count(),
            index_group: 0,
            delay: DelaySettings::default(),
            max_fee_in_usd: default_max_fee_in_usd(),
            min_balance: 0.0,
            max_balance: default_max_balance(),
            slippage: default_slippage(),
            amount_percent: default_amount_percent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaySettings {
    /// Seconds slept between approve and the main transaction.
    #[serde(default = "default_before_receipt")]
    pub before_tx_receipt: [u64; 2],
    #[serde(default = "default_between_tx")]
    pub between_transactions: [u64; 2],
    #[serde(default = "default_between_modules")]
    pub between_modules: [u64; 2],
}

fn default_before_receipt() -> [u64; 2] {
    [10, 30]
}

fn default_between_tx() -> [u64; 2] {
    [30, 120]
}

fn default_between_modules() -> [u64; 2] {
    [120, 600]
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            before_tx_receipt: default_before_receipt(),
            between_transactions: default_between_tx(),
            between_modules: default_between_modules(),
        }
    }
}

impl Settings {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Parse(e, path.display().to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("user_data/_inputs/json/settings.json")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for route in &self.routes {
            if !KNOWN_MODULES.contains(&route.as_str()) {
                return Err(ConfigError::UnknownModule(route.clone()));
            }
        }
        Ok(())
    }

    /// Settings for one module; defaults applied when the file omits it.
    pub fn module(&self, name: &str) -> ModuleSettings {
        self.modules.get(name).cloned().unwrap_or_default()
    }

    /// Settings for a module the engine refuses to default.
    pub fn module_strict(&self, name: &str) -> Result<&ModuleSettings, ConfigError> {
        self.modules
            .get(name)
            .ok_or_else(|| ConfigError::ModuleNotConfigured(name.to_string()))
    }
}

/// Reads `user_data/input_data/private_keys.txt`: one key per line, `#`
/// comments and blank lines skipped, whitespace stripped. Keys are validated
/// against the canonical `0x` + 64-hex shape.
pub async fn read_private_keys<P: AsRef<Path>>(path: P) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut keys = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !is_valid_private_key(line) {
            return Err(ConfigError::InvalidPrivateKey(idx + 1));
        }
        keys.push(line.to_string());
    }
    Ok(keys)
}

/// Reads the optional Starknet companion file: one `private_key,address`
/// pair per line, positionally aligned with `private_keys.txt`. Comments and
/// blank lines are skipped the same way.
pub async fn read_starknet_accounts<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<(String, String)>, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut pairs = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, address) = line
            .split_once(',')
            .ok_or(ConfigError::InvalidPrivateKey(idx + 1))?;
        pairs.push((key.trim().to_string(), address.trim().to_string()));
    }
    Ok(pairs)
}

pub fn is_valid_private_key(key: &str) -> bool {
    key.len() == 66
        && key.starts_with("0x")
        && key[2..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_evm_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_route_module_is_rejected() {
        let settings = Settings {
            routes: vec!["yield-farm".into()],
            threads: None,
            database_url: default_database_url(),
            modules: HashMap::new(),
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::UnknownModule(_))
        ));
    }

    #[test]
    fn module_settings_default_when_absent() {
        let settings = Settings {
            routes: vec!["stargate".into()],
            threads: Some(4),
            database_url: default_database_url(),
            modules: HashMap::new(),
        };
        let m = settings.module("stargate");
        assert_eq!(m.slippage, 0.5);
        assert_eq!(m.delay.before_tx_receipt, [10, 30]);
        assert!(settings.module_strict("stargate").is_err());
    }

    #[test]
    fn private_key_shape_is_enforced() {
        assert!(is_valid_private_key(&format!("0x{}", "a".repeat(64))));
        assert!(!is_valid_private_key(&format!("0x{}", "a".repeat(63))));
        assert!(!is_valid_private_key(&format!("{}", "a".repeat(66))));
        assert!(is_valid_evm_address(&format!("0x{}", "b".repeat(40))));
        assert!(!is_valid_evm_address("0x1234"));
    }

    #[test]
    fn settings_json_parses_with_partial_module_block() {
        let raw = r#"{
            "routes": ["stargate", "mute"],
            "threads": 8,
            "modules": {
                "stargate": {
                    "count": [2, 5],
                    "max_fee_in_usd": 0.5,
                    "delay": { "between_modules": [60, 300] }
                }
            }
        }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        settings.validate().unwrap();
        let m = settings.module("stargate");
        assert_eq!(m.count, [2, 5]);
        assert_eq!(m.max_fee_in_usd, 0.5);
        assert_eq!(m.delay.between_modules, [60, 300]);
        assert_eq!(m.delay.before_tx_receipt, [10, 30]);
    }
}
