//! Startup configuration.
//!
//! All of the values the client needs — RPC endpoints, the expected network,
//! and the three contract addresses — must be present before any operation
//! can succeed. A missing or unparsable value is a fatal [`ConfigError`] at
//! load time, never a per-call error.
//!
//! # Environment Variable Resolution
//!
//! The [`LiteralOrEnv`] wrapper allows configuration values to be specified
//! either as literal values or as references to environment variables:
//!
//! ```json
//! {
//!   "registry": "0x1234...",          // Literal value
//!   "payment": "$PAYMENT_CONTRACT",   // Simple env var
//!   "request": "${REQUEST_CONTRACT}"  // Braced env var
//! }
//! ```
//!
//! This keeps deployment-specific addresses out of checked-in configuration
//! files while still allowing them to be loaded at runtime.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// RPC provider configuration for a single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// HTTP URL for the RPC endpoint.
    pub http: Url,
    /// Rate limit for requests per second (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// The network the client expects to operate on.
///
/// `chain_id` is checked against whatever network an injected provider is
/// connected to; the remaining metadata is what gets offered to the provider
/// when the network has to be added.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Numeric EIP-155 chain id of the expected network.
    pub chain_id: u64,
    /// Human-readable network name.
    pub name: String,
    /// Native currency ticker symbol.
    pub currency_symbol: String,
    /// Block explorer base URL (optional).
    #[serde(default)]
    pub explorer_url: Option<Url>,
}

/// Addresses of the deployed contracts.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    /// Handle registry contract.
    pub registry: LiteralOrEnv<Address>,
    /// Payment contract.
    pub payment: LiteralOrEnv<Address>,
    /// Payment request contract.
    pub request: LiteralOrEnv<Address>,
}

/// Client configuration, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// RPC endpoints, tried in order with per-endpoint rate limits.
    pub rpc: Vec<RpcConfig>,
    /// Expected network.
    pub network: NetworkConfig,
    /// Deployed contract addresses.
    pub contracts: ContractsConfig,
    /// How long to wait for a transaction receipt, in seconds.
    #[serde(default = "config_defaults::default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Where the custodial key record is persisted.
    #[serde(default = "config_defaults::default_keystore_path")]
    pub keystore: PathBuf,
}

pub mod config_defaults {
    use std::path::PathBuf;

    pub fn default_receipt_timeout_secs() -> u64 {
        30
    }

    pub fn default_keystore_path() -> PathBuf {
        PathBuf::from("handlepay-wallet.json")
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("at least one RPC endpoint must be configured")]
    NoRpcEndpoints,
    #[error("unsupported RPC endpoint scheme in {0}: only http(s) endpoints are supported")]
    UnsupportedRpcScheme(Url),
}

impl Config {
    /// Loads configuration from a JSON file.
    ///
    /// Values may reference environment variables via `$VAR` / `${VAR}`
    /// syntax; resolution happens during deserialization. The endpoint list
    /// must be non-empty and all endpoints must be `http(s)`.
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        if config.rpc.is_empty() {
            return Err(ConfigError::NoRpcEndpoints);
        }
        if let Some(endpoint) = config
            .rpc
            .iter()
            .find(|endpoint| !matches!(endpoint.http.scheme(), "http" | "https"))
        {
            return Err(ConfigError::UnsupportedRpcScheme(endpoint.http.clone()));
        }
        Ok(config)
    }
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"0x1234..."`
/// - Simple env var: `"$PAYMENT_CONTRACT"`
/// - Braced env var: `"${PAYMENT_CONTRACT}"`
///
/// The wrapper implements `Deref` to provide transparent access to the inner type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    /// Get a reference to the inner value.
    pub fn inner(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }

    /// Parse environment variable syntax from a string.
    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if s.starts_with("${") && s.ends_with('}') {
            // ${VAR} syntax
            Some(s[2..s.len() - 1].to_string())
        } else if s.starts_with('$') && s.len() > 1 {
            // $VAR syntax - extract until first non-alphanumeric/underscore character
            let var_name = &s[1..];
            if var_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(var_name.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // Check if it's an environment variable reference
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?
        } else {
            s
        };

        // Parse the value as type T
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "rpc": [{ "http": "http://localhost:8545" }],
        "network": { "chain_id": 10143, "name": "Testnet", "currency_symbol": "TST" },
        "contracts": {
            "registry": "0x0000000000000000000000000000000000000001",
            "payment": "0x0000000000000000000000000000000000000002",
            "request": "0x0000000000000000000000000000000000000003"
        }
    }"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.network.chain_id, 10143);
        assert_eq!(config.receipt_timeout_secs, 30);
        assert_eq!(config.keystore, PathBuf::from("handlepay-wallet.json"));
        assert_eq!(
            config.contracts.payment.inner(),
            &"0x0000000000000000000000000000000000000002".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn missing_contracts_fatal_at_parse() {
        let without_contracts = r#"{
            "rpc": [{ "http": "http://localhost:8545" }],
            "network": { "chain_id": 10143, "name": "Testnet", "currency_symbol": "TST" }
        }"#;
        assert!(serde_json::from_str::<Config>(without_contracts).is_err());
    }

    #[test]
    fn empty_rpc_list_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, SAMPLE.replace(r#"[{ "http": "http://localhost:8545" }]"#, "[]")).unwrap();
        assert!(matches!(Config::load_from_path(&path), Err(ConfigError::NoRpcEndpoints)));
    }

    #[test]
    fn non_http_rpc_endpoint_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            SAMPLE.replace("http://localhost:8545", "ws://localhost:8545"),
        )
        .unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(ConfigError::UnsupportedRpcScheme(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, SAMPLE).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.network.currency_symbol, "TST");
    }
}
