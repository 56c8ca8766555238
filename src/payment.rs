//! Payment preparation, submission, and confirmation.
//!
//! A payment flows through three separable stages: [`prepare`] resolves the
//! recipient and assembles calldata without touching the signer,
//! [`submit`] hands the prepared call to the session for signing and
//! broadcast, and [`await_confirmation`] waits for the receipt. Keeping the
//! stages separate lets a caller show the resolved recipient and exact base
//! amount for review before anything is signed.
//!
//! [`prepare`]: PaymentTransactionBuilder::prepare
//! [`submit`]: PaymentTransactionBuilder::submit
//! [`await_confirmation`]: PaymentTransactionBuilder::await_confirmation

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{PendingTransactionError, RootProvider};
use alloy_sol_types::SolCall;

use crate::amount::{AmountError, DisplayAmount};
use crate::chain::{self, ContractCall};
use crate::contracts::IPayment;
use crate::resolver::{HandleFormatError, ResolveHandle, ResolverError, validate_handle};
use crate::session::{Session, SubmitError};
use crate::timestamp::UnixTimestamp;

/// How the sender identified the recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Handle(String),
    Address(Address),
}

impl Recipient {
    /// Classifies raw user input as an address or a handle.
    ///
    /// Anything that parses as a 20-byte hex address is an address;
    /// everything else must pass handle shape validation.
    pub fn parse(input: &str) -> Result<Self, HandleFormatError> {
        if let Ok(address) = Address::from_str(input) {
            return Ok(Recipient::Address(address));
        }
        validate_handle(input)?;
        Ok(Recipient::Handle(input.to_owned()))
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Handle(handle) => write!(f, "@{handle}"),
            Recipient::Address(address) => write!(f, "{address}"),
        }
    }
}

/// A fully assembled payment, ready for signing.
///
/// Resolution and amount conversion are already done; nothing here can
/// change between review and submission.
#[derive(Debug, Clone)]
pub struct PreparedPayment {
    pub recipient: Recipient,
    pub recipient_address: Address,
    pub amount_display: DisplayAmount,
    pub amount_base: U256,
    pub note: String,
    pub call: ContractCall,
}

impl PreparedPayment {
    /// Assembles calldata for a resolved recipient. Pure; no chain access.
    ///
    /// Handle recipients keep the handle in calldata so the contract records
    /// it; address recipients use the direct entry point.
    fn assemble(
        payment_contract: Address,
        recipient: Recipient,
        recipient_address: Address,
        amount_display: DisplayAmount,
        note: String,
    ) -> Result<Self, AmountError> {
        let amount_base = amount_display.to_base_units()?;
        let calldata: Bytes = match &recipient {
            Recipient::Handle(handle) => IPayment::sendPaymentCall {
                handle: handle.clone(),
                note: note.clone(),
            }
            .abi_encode()
            .into(),
            Recipient::Address(address) => IPayment::sendPaymentToAddressCall {
                recipient: *address,
                note: note.clone(),
            }
            .abi_encode()
            .into(),
        };
        Ok(Self {
            recipient,
            recipient_address,
            amount_display,
            amount_base,
            note,
            call: ContractCall {
                to: payment_contract,
                value: amount_base,
                calldata,
            },
        })
    }
}

/// Outcome of a confirmed payment.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Actual fee paid, in base units: gas used times effective gas price.
    pub fee_base: U256,
    pub elapsed: std::time::Duration,
}

/// A payment recorded by the contract.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub note: String,
    pub timestamp: UnixTimestamp,
    pub tx_hash: TxHash,
}

/// Payment-stage errors.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("handle @{0} is not registered")]
    HandleNotFound(String),
    #[error(transparent)]
    Handle(#[from] HandleFormatError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Resolution(#[from] ResolverError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("transaction {0} was mined but reverted")]
    ExecutionFailed(TxHash),
    #[error("confirmation failed: {0}")]
    Confirmation(#[from] PendingTransactionError),
    #[error("payment contract unreachable: {0}")]
    Network(#[from] alloy_contract::Error),
}

/// Builds, submits, and confirms payments against the payment contract.
pub struct PaymentTransactionBuilder {
    payment_contract: Address,
    contract: IPayment::IPaymentInstance<RootProvider>,
    resolver: Arc<dyn ResolveHandle>,
    read: RootProvider,
    receipt_timeout_secs: u64,
}

impl PaymentTransactionBuilder {
    pub fn new(
        payment_contract: Address,
        resolver: Arc<dyn ResolveHandle>,
        read: RootProvider,
        receipt_timeout_secs: u64,
    ) -> Self {
        Self {
            payment_contract,
            contract: IPayment::new(payment_contract, read.clone()),
            resolver,
            read,
            receipt_timeout_secs,
        }
    }

    /// Resolves the recipient and assembles the transaction.
    ///
    /// Handle recipients that resolve to nothing fail here with
    /// `HandleNotFound`; nothing is signed or broadcast.
    pub async fn prepare(
        &self,
        recipient: Recipient,
        amount: DisplayAmount,
        note: String,
    ) -> Result<PreparedPayment, PaymentError> {
        let recipient_address = match &recipient {
            Recipient::Handle(handle) => self
                .resolver
                .address_of(handle)
                .await?
                .ok_or_else(|| PaymentError::HandleNotFound(handle.clone()))?,
            Recipient::Address(address) => *address,
        };
        Ok(PreparedPayment::assemble(
            self.payment_contract,
            recipient,
            recipient_address,
            amount,
            note,
        )?)
    }

    /// Signs and broadcasts a prepared payment.
    ///
    /// Consumes the prepared payment: a failed submission must go back
    /// through [`prepare`](Self::prepare) rather than being replayed.
    pub async fn submit(
        &self,
        session: &Session,
        payment: PreparedPayment,
    ) -> Result<TxHash, PaymentError> {
        let tx_hash = session.submit(&payment.call).await?;
        tracing::info!(
            %tx_hash,
            recipient = %payment.recipient,
            amount = %payment.amount_display,
            "payment submitted"
        );
        Ok(tx_hash)
    }

    /// Waits for the transaction to be mined and checks its status.
    pub async fn await_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> Result<PaymentConfirmation, PaymentError> {
        let started = Instant::now();
        let receipt =
            chain::await_receipt(&self.read, tx_hash, self.receipt_timeout_secs).await?;
        if !receipt.status() {
            return Err(PaymentError::ExecutionFailed(tx_hash));
        }
        Ok(PaymentConfirmation {
            tx_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            fee_base: U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price),
            elapsed: started.elapsed(),
        })
    }

    /// The contract's record of a payment, or `None` if it never saw one
    /// under that hash.
    pub async fn transaction(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let record = self.contract.getTransaction(tx_hash.into()).call().await?;
        if !record.exists {
            return Ok(None);
        }
        Ok(Some(PaymentRecord {
            from: record.from,
            to: record.to,
            amount: record.amount,
            note: record.note,
            timestamp: UnixTimestamp::from_secs(record.timestamp.saturating_to::<u64>()),
            tx_hash: record.txHash.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapResolver(HashMap<String, Address>);

    #[async_trait]
    impl ResolveHandle for MapResolver {
        async fn address_of(&self, handle: &str) -> Result<Option<Address>, ResolverError> {
            Ok(self.0.get(handle).copied())
        }
    }

    fn builder_with(entries: &[(&str, Address)]) -> PaymentTransactionBuilder {
        let map = entries
            .iter()
            .map(|(handle, address)| (handle.to_string(), *address))
            .collect();
        PaymentTransactionBuilder::new(
            Address::repeat_byte(0x02),
            Arc::new(MapResolver(map)),
            RootProvider::new_http("http://localhost:8545".parse().unwrap()),
            30,
        )
    }

    #[tokio::test]
    async fn prepare_resolves_handle_before_assembly() {
        let recipient_address = Address::repeat_byte(0xAA);
        let builder = builder_with(&[("alice", recipient_address)]);
        let prepared = builder
            .prepare(
                Recipient::Handle("alice".into()),
                "12.5".parse().unwrap(),
                "lunch".into(),
            )
            .await
            .unwrap();

        assert_eq!(prepared.recipient_address, recipient_address);
        assert_eq!(
            prepared.amount_base,
            U256::from(12_500_000_000_000_000_000u128)
        );
        assert_eq!(
            &prepared.call.calldata[..4],
            IPayment::sendPaymentCall::SELECTOR
        );
    }

    #[tokio::test]
    async fn prepare_fails_for_unregistered_handle() {
        let builder = builder_with(&[]);
        let result = builder
            .prepare(
                Recipient::Handle("nobody".into()),
                "1".parse().unwrap(),
                String::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(PaymentError::HandleNotFound(handle)) if handle == "nobody"
        ));
    }

    #[test]
    fn recipient_classification() {
        let address = "0x000000000000000000000000000000000000dEaD";
        assert!(matches!(
            Recipient::parse(address),
            Ok(Recipient::Address(_))
        ));
        assert_eq!(
            Recipient::parse("alice"),
            Ok(Recipient::Handle("alice".into()))
        );
        assert!(Recipient::parse("a").is_err());
    }

    #[test]
    fn handle_payment_assembles_send_payment_calldata() {
        let recipient_address = Address::repeat_byte(0xAA);
        let amount: DisplayAmount = "12.5".parse().unwrap();
        let prepared = PreparedPayment::assemble(
            Address::repeat_byte(0x02),
            Recipient::Handle("alice".into()),
            recipient_address,
            amount,
            "lunch".into(),
        )
        .unwrap();

        assert_eq!(
            prepared.amount_base,
            U256::from(12_500_000_000_000_000_000u128)
        );
        assert_eq!(prepared.call.value, prepared.amount_base);
        assert_eq!(prepared.recipient_address, recipient_address);
        assert_eq!(
            &prepared.call.calldata[..4],
            IPayment::sendPaymentCall::SELECTOR
        );
        let decoded = IPayment::sendPaymentCall::abi_decode(&prepared.call.calldata).unwrap();
        assert_eq!(decoded.handle, "alice");
        assert_eq!(decoded.note, "lunch");
    }

    #[test]
    fn address_payment_uses_direct_entry_point() {
        let recipient_address = Address::repeat_byte(0xBB);
        let amount: DisplayAmount = "0.25".parse().unwrap();
        let prepared = PreparedPayment::assemble(
            Address::repeat_byte(0x02),
            Recipient::Address(recipient_address),
            recipient_address,
            amount,
            String::new(),
        )
        .unwrap();

        assert_eq!(
            &prepared.call.calldata[..4],
            IPayment::sendPaymentToAddressCall::SELECTOR
        );
        assert_eq!(prepared.call.value, U256::from(250_000_000_000_000_000u64));
    }

    #[test]
    fn too_precise_amount_fails_assembly() {
        let amount: DisplayAmount = "0.1234567890123456789".parse().unwrap();
        let result = PreparedPayment::assemble(
            Address::repeat_byte(0x02),
            Recipient::Address(Address::repeat_byte(0xBB)),
            Address::repeat_byte(0xBB),
            amount,
            String::new(),
        );
        assert!(matches!(result, Err(AmountError::TooPrecise { .. })));
    }
}
