//! Wallet sessions: signing authority, lifecycle, and submission.
//!
//! Exactly one [`Session`] is live per [`WalletSessionManager`]. A session
//! binds the client to one of two kinds of signing authority:
//!
//! - **Injected**: an external wallet provider (EIP-1193-shaped) that holds
//!   the keys and signs on request, reached through the [`InjectedProvider`]
//!   trait.
//! - **Custodial**: a key pair generated and held by the client itself,
//!   persisted through a [`SecretStore`](keystore::SecretStore).
//!
//! Only one kind is active at a time; switching kinds requires an explicit
//! [`disconnect`](WalletSessionManager::disconnect) first. Mutating
//! operations serialize behind one lock so two concurrent `connect` calls
//! cannot race to set divergent sessions. Account or network change events
//! from an injected provider re-derive the session wholesale via
//! [`resync`](WalletSessionManager::resync) rather than patching it in place.

pub mod keystore;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, B256, TxHash, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use alloy_transport::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chain::{self, ChainSpec, ContractCall};
use crate::config::Config;
use crate::session::keystore::{CustodialKeyRecord, KeystoreError, SecretStore};

/// Combined filler type for gas, blob gas, nonce, and chain ID.
pub type CustodialFiller =
    JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>;

/// The fully composed signing provider used for custodial sessions.
///
/// Combines filler layers for gas, nonce, chain ID, and blob gas with a
/// wallet filler for signing, wrapping a [`RootProvider`] for the actual
/// JSON-RPC communication.
pub type CustodialProvider = FillProvider<
    JoinFill<JoinFill<Identity, CustodialFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// An injected wallet provider, shaped after the EIP-1193 request surface.
///
/// The provider holds the keys; the client only asks it for accounts, the
/// current chain, chain switches, and transaction submission (the provider
/// signs, fills gas, and broadcasts itself).
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    /// Requests signing authority; the provider may prompt the user.
    async fn request_accounts(&self) -> Result<Vec<Address>, InjectedProviderError>;
    /// Chain id the provider is currently connected to.
    async fn chain_id(&self) -> Result<u64, InjectedProviderError>;
    /// Asks the provider to switch to the given chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), InjectedProviderError>;
    /// Asks the provider to add a network it does not know yet.
    async fn add_chain(&self, spec: &ChainSpec) -> Result<(), InjectedProviderError>;
    /// Signs and broadcasts a transaction, returning its hash.
    async fn send_transaction(&self, tx: TransactionRequest)
    -> Result<TxHash, InjectedProviderError>;
}

/// Errors reported by an injected wallet provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InjectedProviderError {
    /// The user declined the request (EIP-1193 code 4001).
    #[error("request rejected by the user")]
    UserRejected,
    /// The requested chain is not known to the provider (code 4902).
    #[error("chain is not known to the wallet provider")]
    UnrecognizedChain,
    /// Any other provider-side failure.
    #[error("wallet provider error: {0}")]
    Rpc(String),
}

/// Out-of-band notifications from an injected provider.
///
/// Both kinds invalidate the live session; the caller must react by
/// re-deriving it (see [`WalletSessionManager::on_provider_event`]) rather
/// than patching address or network in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged,
    ChainChanged,
}

/// The signing authority behind a session.
#[derive(Clone)]
pub enum SigningAuthority {
    /// An external wallet provider holds the keys.
    Injected(Arc<dyn InjectedProvider>),
    /// The client holds the keys and signs locally.
    Custodial(Arc<CustodialProvider>),
}

impl fmt::Debug for SigningAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningAuthority::Injected(_) => f.write_str("Injected"),
            SigningAuthority::Custodial(_) => f.write_str("Custodial"),
        }
    }
}

/// A live binding between the client and a signing authority.
///
/// A session only exists in the connected state: its address and signing
/// capability are always present and its network id matched the expected
/// network when the session was derived.
#[derive(Clone)]
pub struct Session {
    address: Address,
    network_id: u64,
    authority: SigningAuthority,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("network_id", &self.network_id)
            .field("authority", &self.authority)
            .finish()
    }
}

impl Session {
    /// The account address this session signs for.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The chain id the session was derived on.
    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    /// Whether the client itself holds the keys.
    pub fn custodial(&self) -> bool {
        matches!(self.authority, SigningAuthority::Custodial(_))
    }

    /// Signs and broadcasts a contract call, returning the transaction hash.
    ///
    /// There is no retry here: a failed submission must be re-prepared and
    /// resubmitted by the caller, since transactions are not idempotent at
    /// this layer.
    pub async fn submit(&self, call: &ContractCall) -> Result<TxHash, SubmitError> {
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.calldata.clone());
        match &self.authority {
            SigningAuthority::Injected(provider) => provider
                .send_transaction(tx)
                .await
                .map_err(SubmitError::from_injected),
            SigningAuthority::Custodial(provider) => {
                let pending = provider
                    .send_transaction(tx)
                    .await
                    .map_err(SubmitError::from_transport)?;
                Ok(*pending.tx_hash())
            }
        }
    }
}

/// Errors raised while submitting a transaction.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("insufficient funds to cover amount and fees")]
    InsufficientFunds,
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("transaction rejected by the wallet provider")]
    Rejected,
    #[error("network error: {0}")]
    Network(String),
}

impl SubmitError {
    fn from_transport(e: RpcError<TransportErrorKind>) -> Self {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("insufficient funds") {
            SubmitError::InsufficientFunds
        } else if lower.contains("revert") {
            SubmitError::Reverted(message)
        } else {
            SubmitError::Network(message)
        }
    }

    fn from_injected(e: InjectedProviderError) -> Self {
        match e {
            InjectedProviderError::UserRejected => SubmitError::Rejected,
            other => SubmitError::Network(other.to_string()),
        }
    }
}

/// Key material returned by wallet creation, exactly once.
///
/// Callers must surface the recovery phrase to the user here: it is never
/// retrievable again except by re-deriving from the stored private key.
pub struct NewCustodialWallet {
    pub address: Address,
    pub private_key: B256,
    pub mnemonic: String,
}

/// Session-level errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no injected wallet provider is available")]
    ProviderUnavailable,
    #[error("the user rejected the connection request")]
    UserRejected,
    #[error("the wallet provider reported no unlocked accounts")]
    NoAccounts,
    #[error("wrong network: expected chain {expected}, provider is on chain {found}")]
    WrongNetwork { expected: u64, found: u64 },
    #[error("no active wallet session")]
    NotConnected,
    #[error("no custodial wallet is stored")]
    NoStoredWallet,
    #[error("stored wallet record is corrupt: {0}")]
    CorruptRecord(String),
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),
    #[error("wallet provider error: {0}")]
    Provider(InjectedProviderError),
    #[error("network error: {0}")]
    Network(#[source] TransportError),
}

fn connect_error(e: InjectedProviderError) -> SessionError {
    match e {
        InjectedProviderError::UserRejected => SessionError::UserRejected,
        other => SessionError::Provider(other),
    }
}

/// Owns the single live [`Session`] and the custodial key record.
///
/// Components needing signing authority receive a `&Session` from here; the
/// manager is the only place that raises `NotConnected`.
pub struct WalletSessionManager {
    expected_chain_id: u64,
    chain_spec: ChainSpec,
    rpc: RpcClient,
    read: RootProvider,
    injected: Option<Arc<dyn InjectedProvider>>,
    store: Arc<dyn SecretStore>,
    session: RwLock<Option<Session>>,
}

impl WalletSessionManager {
    /// Creates a manager over the configured network.
    ///
    /// `injected` is the externally-injected wallet provider, if one is
    /// present in this environment; `store` holds custodial key material.
    pub fn new(
        config: &Config,
        injected: Option<Arc<dyn InjectedProvider>>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        let rpc = chain::rpc_client(config.network.chain_id, &config.rpc);
        let read = RootProvider::new(rpc.clone());
        Self {
            expected_chain_id: config.network.chain_id,
            chain_spec: ChainSpec::from_network(&config.network, &config.rpc),
            rpc,
            read,
            injected,
            store,
            session: RwLock::new(None),
        }
    }

    /// Read-only provider over the same RPC endpoints, for resolver and
    /// contract reads.
    pub fn read_provider(&self) -> RootProvider {
        self.read.clone()
    }

    /// Whether an injected wallet provider is present. No side effects.
    pub fn is_provider_installed(&self) -> bool {
        self.injected.is_some()
    }

    /// Whether a custodial key record is stored. No side effects.
    pub fn has_custodial_wallet(&self) -> bool {
        self.store.exists()
    }

    /// The current session, if one is live.
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// The current session, or `NotConnected`.
    pub async fn require_session(&self) -> Result<Session, SessionError> {
        self.session().await.ok_or(SessionError::NotConnected)
    }

    /// Requests signing authority from the injected wallet provider.
    ///
    /// If the provider is on the wrong network, one switch request is
    /// issued; if the provider does not know the network, an add-network
    /// request follows. If the provider still reports a different chain
    /// afterwards the connection fails with `WrongNetwork` and no session is
    /// installed, even though the user accepted the connection.
    pub async fn connect(&self) -> Result<Session, SessionError> {
        let provider = self
            .injected
            .clone()
            .ok_or(SessionError::ProviderUnavailable)?;
        let mut guard = self.session.write().await;

        let accounts = provider.request_accounts().await.map_err(connect_error)?;
        let address = *accounts.first().ok_or(SessionError::NoAccounts)?;

        let mut chain_id = provider.chain_id().await.map_err(connect_error)?;
        if chain_id != self.expected_chain_id {
            match provider.switch_chain(self.expected_chain_id).await {
                Ok(()) => {}
                Err(InjectedProviderError::UnrecognizedChain) => provider
                    .add_chain(&self.chain_spec)
                    .await
                    .map_err(|_| SessionError::WrongNetwork {
                        expected: self.expected_chain_id,
                        found: chain_id,
                    })?,
                Err(_) => {
                    return Err(SessionError::WrongNetwork {
                        expected: self.expected_chain_id,
                        found: chain_id,
                    });
                }
            }
            chain_id = provider.chain_id().await.map_err(connect_error)?;
            if chain_id != self.expected_chain_id {
                return Err(SessionError::WrongNetwork {
                    expected: self.expected_chain_id,
                    found: chain_id,
                });
            }
        }

        tracing::info!(address = %address, chain = chain_id, "connected injected wallet");
        let session = Session {
            address,
            network_id: chain_id,
            authority: SigningAuthority::Injected(provider),
        };
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Generates a new custodial key pair and recovery phrase, persists the
    /// key record (overwriting any prior one), and activates a session.
    pub async fn create_custodial_wallet(&self) -> Result<NewCustodialWallet, SessionError> {
        let mut guard = self.session.write().await;

        let mut entropy = [0u8; 16];
        rand::rng().fill_bytes(&mut entropy);
        let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
            .map_err(|e| SessionError::KeyDerivation(e.to_string()))?;
        let phrase = mnemonic.to_string();
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.as_str())
            .build()
            .map_err(|e| SessionError::KeyDerivation(e.to_string()))?;
        let private_key = B256::from_slice(signer.to_bytes().as_ref());

        let record = CustodialKeyRecord {
            address: signer.address(),
            private_key,
            mnemonic: phrase.clone(),
        };
        self.store.store(&record)?;

        let session = self.custodial_session(signer);
        tracing::info!(address = %session.address(), "created custodial wallet");
        *guard = Some(session);

        Ok(NewCustodialWallet {
            address: record.address,
            private_key,
            mnemonic: phrase,
        })
    }

    /// Reconstructs a session from the persisted key record.
    pub async fn load_custodial_wallet(&self) -> Result<Session, SessionError> {
        let mut guard = self.session.write().await;
        let record = self
            .store
            .load()
            .map_err(|e| match e {
                KeystoreError::Corrupt(message) => SessionError::CorruptRecord(message),
                other => SessionError::Keystore(other),
            })?
            .ok_or(SessionError::NoStoredWallet)?;
        let signer = PrivateKeySigner::from_bytes(&record.private_key)
            .map_err(|e| SessionError::CorruptRecord(e.to_string()))?;
        let session = self.custodial_session(signer);
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Clears the live session; a custodial session also erases the
    /// persisted key record.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref()
            && session.custodial()
        {
            self.store.clear()?;
        }
        *guard = None;
        Ok(())
    }

    /// Native-currency balance in base units for the given address, or the
    /// session's own address if omitted.
    pub async fn get_balance(&self, address: Option<Address>) -> Result<U256, SessionError> {
        let address = match address {
            Some(address) => address,
            None => self
                .session
                .read()
                .await
                .as_ref()
                .map(Session::address)
                .ok_or(SessionError::NotConnected)?,
        };
        self.read
            .get_balance(address)
            .await
            .map_err(SessionError::Network)
    }

    /// Reacts to an out-of-band provider notification by re-deriving the
    /// session. See [`resync`](Self::resync).
    pub async fn on_provider_event(
        &self,
        event: ProviderEvent,
    ) -> Result<Option<Session>, SessionError> {
        tracing::debug!(?event, "provider event, re-deriving session");
        self.resync().await
    }

    /// Re-derives an injected session from the provider's current accounts
    /// and chain, replacing the session wholesale.
    ///
    /// Custodial sessions are unaffected. If the provider has moved to an
    /// account-less or wrong-network state, the session is dropped (fully
    /// disconnected) and the error reported, so a caller can never read one
    /// address's balance under another address's signer.
    pub async fn resync(&self) -> Result<Option<Session>, SessionError> {
        let mut guard = self.session.write().await;
        let Some(current) = guard.as_ref() else {
            return Ok(None);
        };
        let SigningAuthority::Injected(provider) = &current.authority else {
            return Ok(guard.clone());
        };
        let provider = provider.clone();

        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                *guard = None;
                return Err(connect_error(e));
            }
        };
        let Some(address) = accounts.first().copied() else {
            *guard = None;
            return Err(SessionError::NoAccounts);
        };
        let chain_id = match provider.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                *guard = None;
                return Err(connect_error(e));
            }
        };
        if chain_id != self.expected_chain_id {
            *guard = None;
            return Err(SessionError::WrongNetwork {
                expected: self.expected_chain_id,
                found: chain_id,
            });
        }

        let session = Session {
            address,
            network_id: chain_id,
            authority: SigningAuthority::Injected(provider),
        };
        *guard = Some(session.clone());
        Ok(Some(session))
    }

    fn custodial_session(&self, signer: PrivateKeySigner) -> Session {
        let signer = signer.with_chain_id(Some(self.expected_chain_id));
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);
        // Filler stack: Gas -> BlobGas -> Nonce -> ChainId, then the wallet.
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(NonceFiller::default(), ChainIdFiller::default()),
            ),
        );
        let provider: CustodialProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(self.rpc.clone());
        Session {
            address,
            network_id: self.expected_chain_id,
            authority: SigningAuthority::Custodial(Arc::new(provider)),
        }
    }
}
