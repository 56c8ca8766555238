//! Payment requests: creation, fulfillment, cancellation, and queries.
//!
//! Request identifiers come in two flavors. The *candidate* id is computed
//! locally before submission, from the requester, amount, a timestamp, and
//! the note; it lets a caller render a QR code or share a link immediately.
//! The *authoritative* id is whatever the contract assigns, read back from
//! the creation event in the receipt. The two usually coincide, but only the
//! authoritative id is trusted for fulfillment and queries.

use std::time::Instant;

use alloy_primitives::{Address, B256, TxHash, U256, keccak256};
use alloy_provider::{PendingTransactionError, RootProvider};
use alloy_rpc_types_eth::TransactionReceipt;
use alloy_sol_types::{SolCall, SolEvent, SolValue};

use crate::amount::{AmountError, DisplayAmount};
use crate::chain::{self, ContractCall};
use crate::contracts::IPaymentRequest;
use crate::session::{Session, SubmitError};
use crate::timestamp::UnixTimestamp;

/// Computes the id the contract is expected to assign to a request created
/// with these inputs at this timestamp.
///
/// Mirrors the contract's derivation: keccak over the `abi.encode` parameter
/// sequence (requester, amount, timestamp, 0, note) — head/tail layout, no
/// outer tuple offset. Advisory only; the id the contract actually emits is
/// authoritative.
pub fn candidate_request_id(
    requester: Address,
    amount: U256,
    now: UnixTimestamp,
    note: &str,
) -> B256 {
    let encoded = (
        requester,
        amount,
        U256::from(now.as_secs()),
        U256::ZERO,
        note.to_owned(),
    )
        .abi_encode_params();
    keccak256(&encoded)
}

/// A request assembled locally and not yet submitted.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    /// Locally computed id; see [`candidate_request_id`].
    pub candidate_id: B256,
    pub requester: Address,
    pub amount_base: U256,
    pub note: String,
    /// Unix seconds after which the request lapses; zero means never.
    pub expiry: u64,
    pub call: ContractCall,
}

/// A request as recorded by the contract.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub request_id: B256,
    pub requester: Address,
    pub requester_handle: String,
    pub amount: U256,
    pub note: String,
    pub expiry: u64,
    pub fulfilled: bool,
    pub cancelled: bool,
    pub created_at: UnixTimestamp,
}

impl PaymentRequest {
    /// Whether the request can still be fulfilled at the given time.
    pub fn is_open_at(&self, now: UnixTimestamp) -> bool {
        !self.fulfilled && !self.cancelled && (self.expiry == 0 || self.expiry > now.as_secs())
    }
}

impl From<IPaymentRequest::Request> for PaymentRequest {
    fn from(raw: IPaymentRequest::Request) -> Self {
        Self {
            request_id: raw.requestId,
            requester: raw.requester,
            requester_handle: raw.requesterHandle,
            amount: raw.amount,
            note: raw.note,
            expiry: raw.expiry.saturating_to::<u64>(),
            fulfilled: raw.fulfilled,
            cancelled: raw.cancelled,
            created_at: UnixTimestamp::from_secs(raw.createdAt.saturating_to::<u64>()),
        }
    }
}

/// Request-ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("transaction {0} was mined but reverted")]
    ExecutionFailed(TxHash),
    #[error("confirmation failed: {0}")]
    Confirmation(#[from] PendingTransactionError),
    #[error("request contract unreachable: {0}")]
    Unreachable(#[from] alloy_contract::Error),
    #[error("receipt for {0} carries no request-created event")]
    MissingCreatedEvent(TxHash),
}

/// Client for the payment-request contract.
pub struct PaymentRequestLedger {
    request_contract: Address,
    contract: IPaymentRequest::IPaymentRequestInstance<RootProvider>,
    read: RootProvider,
    receipt_timeout_secs: u64,
}

impl PaymentRequestLedger {
    pub fn new(request_contract: Address, read: RootProvider, receipt_timeout_secs: u64) -> Self {
        Self {
            request_contract,
            contract: IPaymentRequest::new(request_contract, read.clone()),
            read,
            receipt_timeout_secs,
        }
    }

    /// Assembles a creation call and its candidate id. Pure; no chain
    /// access, nothing signed.
    pub fn create_request(
        &self,
        requester: Address,
        amount: DisplayAmount,
        note: String,
        expiry: u64,
    ) -> Result<RequestDraft, RequestError> {
        let amount_base = amount.to_base_units()?;
        let candidate_id =
            candidate_request_id(requester, amount_base, UnixTimestamp::now(), &note);
        let calldata = IPaymentRequest::createRequestCall {
            amount: amount_base,
            note: note.clone(),
            expiry: U256::from(expiry),
        }
        .abi_encode();
        Ok(RequestDraft {
            candidate_id,
            requester,
            amount_base,
            note,
            expiry,
            call: ContractCall {
                to: self.request_contract,
                value: U256::ZERO,
                calldata: calldata.into(),
            },
        })
    }

    /// Signs and broadcasts a drafted creation call.
    pub async fn submit(&self, session: &Session, draft: &RequestDraft) -> Result<TxHash, RequestError> {
        let tx_hash = session.submit(&draft.call).await?;
        tracing::info!(%tx_hash, candidate_id = %draft.candidate_id, "payment request submitted");
        Ok(tx_hash)
    }

    /// Waits for the creation transaction and extracts the authoritative
    /// request id from the emitted event.
    pub async fn await_confirmation(&self, tx_hash: TxHash) -> Result<B256, RequestError> {
        let started = Instant::now();
        let receipt =
            chain::await_receipt(&self.read, tx_hash, self.receipt_timeout_secs).await?;
        if !receipt.status() {
            return Err(RequestError::ExecutionFailed(tx_hash));
        }
        let request_id = confirmed_request_id(&receipt)
            .ok_or(RequestError::MissingCreatedEvent(tx_hash))?;
        tracing::info!(
            %tx_hash,
            %request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "payment request confirmed"
        );
        Ok(request_id)
    }

    /// Assembles a fulfillment call carrying the request amount as value.
    pub fn fulfill(&self, request: &PaymentRequest) -> ContractCall {
        let calldata = IPaymentRequest::fulfillRequestCall {
            requestId: request.request_id,
        }
        .abi_encode();
        ContractCall {
            to: self.request_contract,
            value: request.amount,
            calldata: calldata.into(),
        }
    }

    /// Assembles a cancellation call for the requester to sign.
    pub fn cancel(&self, request_id: B256) -> ContractCall {
        let calldata = IPaymentRequest::cancelRequestCall { requestId: request_id }.abi_encode();
        ContractCall {
            to: self.request_contract,
            value: U256::ZERO,
            calldata: calldata.into(),
        }
    }

    /// The request stored under an id, or `None` for an unknown id.
    ///
    /// The contract reports an unknown id as a record with a zero request
    /// id; that sentinel never leaves this method.
    pub async fn get_request(&self, request_id: B256) -> Result<Option<PaymentRequest>, RequestError> {
        let raw = self.contract.getRequest(request_id).call().await?;
        if raw.requestId == B256::ZERO {
            return Ok(None);
        }
        Ok(Some(raw.into()))
    }

    /// All request ids ever created by an address, oldest first.
    pub async fn get_user_requests(&self, requester: Address) -> Result<Vec<B256>, RequestError> {
        Ok(self.contract.getUserRequests(requester).call().await?)
    }

    /// The contract's own view of whether a request is still fulfillable.
    pub async fn is_valid(&self, request_id: B256) -> Result<bool, RequestError> {
        Ok(self.contract.isRequestValid(request_id).call().await?)
    }
}

/// Extracts the request id emitted by the creation event, if the receipt
/// carries one from this contract family.
fn confirmed_request_id(receipt: &TransactionReceipt) -> Option<B256> {
    receipt
        .inner
        .logs()
        .iter()
        .find(|log| log.topic0() == Some(&IPaymentRequest::PaymentRequestCreated::SIGNATURE_HASH))
        .and_then(|log| log.topics().get(1).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_id_is_deterministic() {
        let requester = Address::repeat_byte(0xAA);
        let amount = U256::from(1_000_000_000_000_000_000u128);
        let now = UnixTimestamp::from_secs(1_700_000_000);

        let a = candidate_request_id(requester, amount, now, "coffee");
        let b = candidate_request_id(requester, amount, now, "coffee");
        assert_eq!(a, b);
    }

    #[test]
    fn candidate_id_hashes_the_parameter_sequence() {
        let requester = Address::repeat_byte(0xAA);
        let amount = U256::from(1_000_000_000_000_000_000u128);
        let now = UnixTimestamp::from_secs(1_700_000_000);
        let inputs = (
            requester,
            amount,
            U256::from(now.as_secs()),
            U256::ZERO,
            "coffee".to_owned(),
        );

        // abi.encode of a parameter list lays the values out head/tail with
        // no outer tuple offset; hashing the single-tuple encoding instead
        // would diverge from the contract.
        let id = candidate_request_id(requester, amount, now, "coffee");
        assert_eq!(id, keccak256(inputs.abi_encode_params()));
        assert_ne!(id, keccak256(inputs.abi_encode()));
    }

    #[test]
    fn candidate_id_is_sensitive_to_every_input() {
        let requester = Address::repeat_byte(0xAA);
        let amount = U256::from(1u64);
        let now = UnixTimestamp::from_secs(1_700_000_000);
        let base = candidate_request_id(requester, amount, now, "coffee");

        assert_ne!(
            base,
            candidate_request_id(Address::repeat_byte(0xBB), amount, now, "coffee")
        );
        assert_ne!(
            base,
            candidate_request_id(requester, U256::from(2u64), now, "coffee")
        );
        assert_ne!(
            base,
            candidate_request_id(requester, amount, now + 1, "coffee")
        );
        assert_ne!(base, candidate_request_id(requester, amount, now, "tea"));
    }

    #[test]
    fn open_state_respects_expiry_and_flags() {
        let request = PaymentRequest {
            request_id: B256::repeat_byte(0x01),
            requester: Address::repeat_byte(0xAA),
            requester_handle: "alice".into(),
            amount: U256::from(5u64),
            note: String::new(),
            expiry: 100,
            fulfilled: false,
            cancelled: false,
            created_at: UnixTimestamp::from_secs(50),
        };
        assert!(request.is_open_at(UnixTimestamp::from_secs(99)));
        assert!(!request.is_open_at(UnixTimestamp::from_secs(100)));
        assert!(!request.is_open_at(UnixTimestamp::from_secs(200)));

        let mut never_expires = request.clone();
        never_expires.expiry = 0;
        assert!(never_expires.is_open_at(UnixTimestamp::from_secs(u64::MAX)));

        let mut fulfilled = request.clone();
        fulfilled.fulfilled = true;
        assert!(!fulfilled.is_open_at(UnixTimestamp::from_secs(99)));

        let mut cancelled = request;
        cancelled.cancelled = true;
        assert!(!cancelled.is_open_at(UnixTimestamp::from_secs(99)));
    }

    #[test]
    fn draft_carries_creation_calldata_and_zero_value() {
        let ledger = PaymentRequestLedger::new(
            Address::repeat_byte(0x03),
            RootProvider::new_http("http://localhost:8545".parse().unwrap()),
            30,
        );
        let amount: DisplayAmount = "2.5".parse().unwrap();
        let draft = ledger
            .create_request(Address::repeat_byte(0xAA), amount, "dinner".into(), 0)
            .unwrap();

        assert_eq!(draft.amount_base, U256::from(2_500_000_000_000_000_000u128));
        assert_eq!(draft.call.value, U256::ZERO);
        assert_eq!(
            &draft.call.calldata[..4],
            IPaymentRequest::createRequestCall::SELECTOR
        );
    }

    #[test]
    fn fulfillment_call_carries_amount_as_value() {
        let ledger = PaymentRequestLedger::new(
            Address::repeat_byte(0x03),
            RootProvider::new_http("http://localhost:8545".parse().unwrap()),
            30,
        );
        let request = PaymentRequest {
            request_id: B256::repeat_byte(0x07),
            requester: Address::repeat_byte(0xAA),
            requester_handle: "alice".into(),
            amount: U256::from(42u64),
            note: String::new(),
            expiry: 0,
            fulfilled: false,
            cancelled: false,
            created_at: UnixTimestamp::from_secs(0),
        };
        let call = ledger.fulfill(&request);
        assert_eq!(call.value, U256::from(42u64));
        assert_eq!(
            &call.calldata[..4],
            IPaymentRequest::fulfillRequestCall::SELECTOR
        );
    }
}
