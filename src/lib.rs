//! Core client for handle-addressed peer-to-peer payments on an EVM network.
//!
//! This crate lets a user identified by a human-readable handle send and
//! request native-currency value without touching raw addresses. Handles are
//! resolved through an on-chain registry contract, payments go through a
//! payment contract (which emits distinct events for pay-by-handle and
//! pay-by-address), and payment requests live in a request contract.
//!
//! # Roles
//!
//! - **Session**: the live binding between this client and a signing
//!   authority, either an injected wallet provider (EIP-1193-shaped) or a
//!   custodial key pair generated and held by the client itself. See
//!   [`session::WalletSessionManager`].
//! - **Resolver**: read-only handle ↔ address lookups against the registry.
//!   See [`resolver::HandleResolver`].
//! - **Payments**: explicit prepare → submit → await-confirmation steps, so a
//!   caller can show exact amounts before committing. See
//!   [`payment::PaymentTransactionBuilder`].
//! - **Requests**: client-side assembly of `createRequest` calls with an
//!   advisory candidate identifier; the contract-assigned identifier is read
//!   back from the submission receipt. See [`request::PaymentRequestLedger`].
//! - **QR codec**: compact `handlepay://` payload strings for sharing
//!   requests and handles. See [`qr`].
//!
//! # Modules
//!
//! - [`amount`] — exact display-string ↔ 18-decimal base-unit conversion.
//! - [`chain`] — RPC client construction, contract-call values, receipt waits.
//! - [`config`] — startup configuration; missing values are fatal at load.
//! - [`contracts`] — `sol!` bindings for the deployed contracts.
//! - [`payment`] — payment preparation, submission, and confirmation.
//! - [`qr`] — QR payload codec.
//! - [`request`] — payment request assembly and registry reads.
//! - [`resolver`] — handle resolution.
//! - [`session`] — wallet sessions and key custody.
//! - [`timestamp`] — Unix timestamp type used for expiries.

pub mod amount;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod payment;
pub mod qr;
pub mod request;
pub mod resolver;
pub mod session;
pub mod timestamp;
