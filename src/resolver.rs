//! Handle resolution against the on-chain registry.
//!
//! Handles are human-readable names mapped to addresses by the registry
//! contract. Resolution is always live: every lookup goes to the chain, so a
//! freshly registered or released handle is visible immediately.

use alloy_primitives::{Address, U256};
use alloy_provider::RootProvider;
use async_trait::async_trait;

use crate::contracts::IHandleRegistry;

const HANDLE_MIN_LEN: usize = 2;
const HANDLE_MAX_LEN: usize = 30;

/// A handle string fails local shape validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handle must be between {HANDLE_MIN_LEN} and {HANDLE_MAX_LEN} characters")]
pub struct HandleFormatError;

/// Checks handle length bounds before any chain round-trip.
pub fn validate_handle(handle: &str) -> Result<(), HandleFormatError> {
    let len = handle.chars().count();
    if (HANDLE_MIN_LEN..=HANDLE_MAX_LEN).contains(&len) {
        Ok(())
    } else {
        Err(HandleFormatError)
    }
}

/// Errors raised by registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("handle registry unreachable: {0}")]
    RegistryUnreachable(#[source] alloy_contract::Error),
}

/// The handle → address lookup seam consumed by payment preparation.
///
/// [`HandleResolver`] is the on-chain implementation.
#[async_trait]
pub trait ResolveHandle: Send + Sync {
    /// The address a handle points to, or `None` if unregistered.
    async fn address_of(&self, handle: &str) -> Result<Option<Address>, ResolverError>;
}

#[async_trait]
impl ResolveHandle for HandleResolver {
    async fn address_of(&self, handle: &str) -> Result<Option<Address>, ResolverError> {
        HandleResolver::address_of(self, handle).await
    }
}

/// Read-only client for the handle registry contract.
#[derive(Clone)]
pub struct HandleResolver {
    registry: IHandleRegistry::IHandleRegistryInstance<RootProvider>,
}

impl HandleResolver {
    pub fn new(registry: Address, provider: RootProvider) -> Self {
        Self {
            registry: IHandleRegistry::new(registry, provider),
        }
    }

    /// Whether the handle is free to register.
    pub async fn is_available(&self, handle: &str) -> Result<bool, ResolverError> {
        self.registry
            .isHandleAvailable(handle.to_owned())
            .call()
            .await
            .map_err(ResolverError::RegistryUnreachable)
    }

    /// The address a handle points to, or `None` if unregistered.
    ///
    /// The registry reports an unregistered handle as the zero address; that
    /// sentinel never leaves this method.
    pub async fn address_of(&self, handle: &str) -> Result<Option<Address>, ResolverError> {
        let address = self
            .registry
            .getAddressByHandle(handle.to_owned())
            .call()
            .await
            .map_err(ResolverError::RegistryUnreachable)?;
        if address == Address::ZERO {
            Ok(None)
        } else {
            Ok(Some(address))
        }
    }

    /// The handle registered for an address, or `None`.
    ///
    /// The registry reports an unregistered address as the empty string.
    pub async fn handle_of(&self, address: Address) -> Result<Option<String>, ResolverError> {
        let handle = self
            .registry
            .getHandleByAddress(address)
            .call()
            .await
            .map_err(ResolverError::RegistryUnreachable)?;
        if handle.is_empty() {
            Ok(None)
        } else {
            Ok(Some(handle))
        }
    }

    /// The one-time registration fee, in base units.
    pub async fn handle_fee(&self) -> Result<U256, ResolverError> {
        self.registry
            .HANDLE_FEE()
            .call()
            .await
            .map_err(ResolverError::RegistryUnreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_length_bounds() {
        assert!(validate_handle("ab").is_ok());
        assert!(validate_handle("a").is_err());
        assert!(validate_handle("").is_err());
        assert!(validate_handle(&"x".repeat(30)).is_ok());
        assert!(validate_handle(&"x".repeat(31)).is_err());
    }

    #[test]
    fn handle_length_counts_characters_not_bytes() {
        // Two characters, four bytes.
        assert!(validate_handle("ää").is_ok());
    }
}
