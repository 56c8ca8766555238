//! handlepay command-line client.
//!
//! Sends native-currency payments to handles or addresses, manages a local
//! custodial wallet, resolves handles against the on-chain registry, and
//! creates and settles payment requests.
//!
//! Commands:
//! - `wallet create|show|remove` – manage the local custodial wallet
//! - `balance [ADDRESS]` – native balance of the wallet or a given address
//! - `resolve HANDLE` / `handle-of ADDRESS` – registry lookups
//! - `send RECIPIENT AMOUNT` – pay a handle or address
//! - `request new|show|fulfill|cancel` – payment requests
//! - `qr encode-handle|decode` – shareable payment links
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the configuration file (default `config.json`)
//! - `RUST_LOG` controls log verbosity

use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use handlepay::amount::{DisplayAmount, format_base_units};
use handlepay::config::Config;
use handlepay::payment::{PaymentTransactionBuilder, Recipient};
use handlepay::qr::{self, QrPayload, QrPaymentRequest};
use handlepay::request::PaymentRequestLedger;
use handlepay::resolver::HandleResolver;
use handlepay::session::WalletSessionManager;
use handlepay::session::keystore::FileSecretStore;
use handlepay::timestamp::UnixTimestamp;

#[derive(Parser)]
#[command(name = "handlepay", version, about = "Peer-to-peer payments by handle")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the local custodial wallet.
    Wallet {
        #[command(subcommand)]
        command: WalletCommand,
    },
    /// Show a native-currency balance.
    Balance {
        /// Address to query; defaults to the local wallet.
        address: Option<Address>,
    },
    /// Look up the address a handle points to.
    Resolve { handle: String },
    /// Look up the handle registered for an address.
    HandleOf { address: Address },
    /// Send a payment to a handle or address.
    Send {
        /// Recipient handle or 0x address.
        recipient: String,
        /// Amount in whole currency units, e.g. `12.5`.
        amount: String,
        /// Note recorded with the payment.
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Create and settle payment requests.
    Request {
        #[command(subcommand)]
        command: RequestCommand,
    },
    /// Encode and decode shareable payment links.
    Qr {
        #[command(subcommand)]
        command: QrCommand,
    },
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Generate a wallet and print its recovery phrase once.
    Create,
    /// Show the stored wallet's address.
    Show,
    /// Delete the stored wallet.
    Remove,
}

#[derive(Subcommand)]
enum RequestCommand {
    /// Create a payment request and print its id and link.
    New {
        /// Amount in whole currency units.
        amount: String,
        #[arg(long, default_value = "")]
        note: String,
        /// Seconds until the request lapses; 0 means never.
        #[arg(long, default_value_t = 0)]
        expires_in: u64,
    },
    /// Show a request by id.
    Show { id: B256 },
    /// Pay an open request.
    Fulfill { id: B256 },
    /// Cancel a request you created.
    Cancel { id: B256 },
}

#[derive(Subcommand)]
enum QrCommand {
    /// Encode a handle as a shareable link.
    EncodeHandle { handle: String },
    /// Decode a scanned link.
    Decode { payload: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load_from_path(&cli.config)?;
    let manager = WalletSessionManager::new(
        &config,
        None,
        Arc::new(FileSecretStore::new(config.keystore.clone())),
    );
    let read = manager.read_provider();
    let resolver = HandleResolver::new(*config.contracts.registry, read.clone());
    let payments = PaymentTransactionBuilder::new(
        *config.contracts.payment,
        Arc::new(resolver.clone()),
        read.clone(),
        config.receipt_timeout_secs,
    );
    let requests =
        PaymentRequestLedger::new(*config.contracts.request, read, config.receipt_timeout_secs);
    let symbol = config.network.currency_symbol.clone();

    match cli.command {
        Command::Wallet { command } => match command {
            WalletCommand::Create => {
                let wallet = manager.create_custodial_wallet().await?;
                println!("address:  {}", wallet.address);
                println!("recovery phrase (shown once, store it safely):");
                println!("  {}", wallet.mnemonic);
            }
            WalletCommand::Show => {
                let session = manager.load_custodial_wallet().await?;
                println!("address: {}", session.address());
            }
            WalletCommand::Remove => {
                manager.load_custodial_wallet().await?;
                manager.disconnect().await?;
                println!("wallet removed");
            }
        },
        Command::Balance { address } => {
            if address.is_none() {
                manager.load_custodial_wallet().await?;
            }
            let balance = manager.get_balance(address).await?;
            println!("{} {symbol}", format_base_units(balance));
        }
        Command::Resolve { handle } => match resolver.address_of(&handle).await? {
            Some(address) => println!("{address}"),
            None => println!("@{handle} is not registered"),
        },
        Command::HandleOf { address } => match resolver.handle_of(address).await? {
            Some(handle) => println!("@{handle}"),
            None => println!("{address} has no handle"),
        },
        Command::Send {
            recipient,
            amount,
            note,
        } => {
            let session = manager.load_custodial_wallet().await?;
            let recipient = Recipient::parse(&recipient)?;
            let amount = DisplayAmount::parse(&amount)?;
            let prepared = payments.prepare(recipient, amount, note).await?;
            println!(
                "sending {} {symbol} to {} ({})",
                prepared.amount_display, prepared.recipient, prepared.recipient_address
            );
            let tx_hash = payments.submit(&session, prepared).await?;
            println!("submitted: {tx_hash}");
            let confirmation = payments.await_confirmation(tx_hash).await?;
            println!(
                "confirmed in block {} after {:.1}s, fee {} {symbol}",
                confirmation.block_number,
                confirmation.elapsed.as_secs_f64(),
                format_base_units(confirmation.fee_base),
            );
        }
        Command::Request { command } => match command {
            RequestCommand::New {
                amount,
                note,
                expires_in,
            } => {
                let session = manager.load_custodial_wallet().await?;
                let amount = DisplayAmount::parse(&amount)?;
                let expiry = if expires_in == 0 {
                    0
                } else {
                    (UnixTimestamp::now() + expires_in).as_secs()
                };
                let draft = requests.create_request(
                    session.address(),
                    amount.clone(),
                    note.clone(),
                    expiry,
                )?;
                println!("candidate id: {}", draft.candidate_id);
                let tx_hash = requests.submit(&session, &draft).await?;
                let request_id = requests.await_confirmation(tx_hash).await?;
                println!("request id:   {request_id}");
                let handle = resolver
                    .handle_of(session.address())
                    .await?
                    .unwrap_or_default();
                let link = qr::encode_request(&QrPaymentRequest {
                    requester: session.address().to_string(),
                    requester_handle: handle,
                    amount_display: amount.to_string(),
                    note,
                    request_id: request_id.to_string(),
                });
                println!("link:         {link}");
            }
            RequestCommand::Show { id } => match requests.get_request(id).await? {
                Some(request) => {
                    println!("requester: {} (@{})", request.requester, request.requester_handle);
                    println!("amount:    {} {symbol}", format_base_units(request.amount));
                    if !request.note.is_empty() {
                        println!("note:      {}", request.note);
                    }
                    let state = if request.fulfilled {
                        "fulfilled"
                    } else if request.cancelled {
                        "cancelled"
                    } else if request.is_open_at(UnixTimestamp::now()) {
                        "open"
                    } else {
                        "expired"
                    };
                    println!("state:     {state}");
                }
                None => println!("no request with id {id}"),
            },
            RequestCommand::Fulfill { id } => {
                let session = manager.load_custodial_wallet().await?;
                let request = requests
                    .get_request(id)
                    .await?
                    .ok_or_else(|| format!("no request with id {id}"))?;
                if !request.is_open_at(UnixTimestamp::now()) {
                    return Err(format!("request {id} is no longer open").into());
                }
                let call = requests.fulfill(&request);
                println!(
                    "paying {} {symbol} to {}",
                    format_base_units(request.amount),
                    request.requester
                );
                let tx_hash = session.submit(&call).await?;
                println!("submitted: {tx_hash}");
                let confirmation = payments.await_confirmation(tx_hash).await?;
                println!("confirmed in block {}", confirmation.block_number);
            }
            RequestCommand::Cancel { id } => {
                let session = manager.load_custodial_wallet().await?;
                let call = requests.cancel(id);
                let tx_hash = session.submit(&call).await?;
                println!("submitted: {tx_hash}");
                let confirmation = payments.await_confirmation(tx_hash).await?;
                println!("cancelled in block {}", confirmation.block_number);
            }
        },
        Command::Qr { command } => match command {
            QrCommand::EncodeHandle { handle } => println!("{}", qr::encode_handle(&handle)),
            QrCommand::Decode { payload } => match qr::decode(&payload)? {
                QrPayload::PaymentRequest(request) => {
                    println!("payment request");
                    println!("  requester: {}", request.requester);
                    if !request.requester_handle.is_empty() {
                        println!("  handle:    @{}", request.requester_handle);
                    }
                    println!("  amount:    {}", request.amount_display);
                    if !request.note.is_empty() {
                        println!("  note:      {}", request.note);
                    }
                    if !request.request_id.is_empty() {
                        println!("  id:        {}", request.request_id);
                    }
                }
                QrPayload::Handle(handle) => println!("handle: @{handle}"),
                QrPayload::Unknown => println!("unrecognized payload type"),
            },
        },
    }
    Ok(())
}
