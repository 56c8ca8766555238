//! Network plumbing: RPC client construction, contract-call values, and
//! receipt waits.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{PendingTransactionBuilder, PendingTransactionError, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::TransactionReceipt;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::time::Duration;
use tower::ServiceBuilder;
use url::Url;

use crate::config::{NetworkConfig, RpcConfig};

/// Builds the shared RPC client over the configured HTTP endpoints.
///
/// Each endpoint gets its own throttle layer honoring the configured rate
/// limit; the endpoints together sit behind a fallback layer so a failing
/// endpoint does not take the client down.
pub fn rpc_client(chain_id: u64, rpc: &[RpcConfig]) -> RpcClient {
    let transports = rpc
        .iter()
        .filter_map(|endpoint| {
            let scheme = endpoint.http.scheme();
            let is_http = scheme == "http" || scheme == "https";
            if !is_http {
                return None;
            }
            let rpc_url = endpoint.http.clone();
            tracing::info!(chain = chain_id, rpc_url = %rpc_url, rate_limit = ?endpoint.rate_limit, "Using HTTP transport");
            let rate_limit = endpoint.rate_limit.unwrap_or(u32::MAX);
            let service = ServiceBuilder::new()
                .layer(ThrottleLayer::new(rate_limit))
                .service(Http::new(rpc_url));
            Some(service)
        })
        .collect::<Vec<_>>();
    let fallback = ServiceBuilder::new()
        .layer(
            FallbackLayer::default().with_active_transport_count(
                NonZeroUsize::new(transports.len())
                    .expect("Non-zero amount of stateless transports"),
            ),
        )
        .service(transports);
    RpcClient::new(fallback, false)
}

/// A contract call ready for submission: target address, attached value, and
/// encoded calldata.
#[derive(Debug, Clone)]
pub struct ContractCall {
    /// Target contract address.
    pub to: Address,
    /// Native-currency value attached to the call, in base units.
    pub value: U256,
    /// Encoded function call.
    pub calldata: Bytes,
}

/// Waits for the receipt of a submitted transaction.
///
/// Resolves once the transaction has one confirmation or fails when the
/// timeout expires. An unconfirmed transaction remains valid to re-query
/// indefinitely, so a caller that hits the timeout may simply call again.
pub async fn await_receipt(
    read: &RootProvider,
    tx_hash: TxHash,
    timeout_secs: u64,
) -> Result<TransactionReceipt, PendingTransactionError> {
    PendingTransactionBuilder::new(read.clone(), tx_hash)
        .with_required_confirmations(1)
        .with_timeout(Some(Duration::from_secs(timeout_secs)))
        .get_receipt()
        .await
}

/// Parameters for a `wallet_addEthereumChain` request, offered to an injected
/// provider that does not know the expected network.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainSpec {
    /// Chain id as a 0x-prefixed hex string, as the provider expects it.
    pub chain_id: String,
    /// Human-readable network name.
    pub chain_name: String,
    /// Native currency metadata.
    pub native_currency: NativeCurrency,
    /// RPC endpoints of the network.
    pub rpc_urls: Vec<Url>,
    /// Block explorer URLs, if any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub block_explorer_urls: Vec<Url>,
}

/// Native currency metadata within a [`ChainSpec`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl ChainSpec {
    /// Derives the add-chain payload from the configured network.
    pub fn from_network(network: &NetworkConfig, rpc: &[RpcConfig]) -> Self {
        ChainSpec {
            chain_id: format!("0x{:x}", network.chain_id),
            chain_name: network.name.clone(),
            native_currency: NativeCurrency {
                name: network.currency_symbol.clone(),
                symbol: network.currency_symbol.clone(),
                decimals: 18,
            },
            rpc_urls: rpc.iter().map(|endpoint| endpoint.http.clone()).collect(),
            block_explorer_urls: network.explorer_url.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_spec_uses_hex_chain_id() {
        let network = NetworkConfig {
            chain_id: 10143,
            name: "Testnet".into(),
            currency_symbol: "TST".into(),
            explorer_url: None,
        };
        let rpc = vec![RpcConfig {
            http: "http://localhost:8545".parse().unwrap(),
            rate_limit: None,
        }];
        let spec = ChainSpec::from_network(&network, &rpc);
        assert_eq!(spec.chain_id, "0x279f");
        assert_eq!(spec.native_currency.decimals, 18);
        assert_eq!(spec.rpc_urls.len(), 1);
    }
}
