//! # Ledger Client Engine
//!
//! The client-side request engine for a replicated ledger: it picks replica
//! nodes, tracks their health, retries with backoff, and fans transactions
//! out across nodes and chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                                  Client                                   │
//! │                                                                           │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────────────┐  │
//! │  │ Transaction  │───►│   Executor   │───►│ Network<Consensus>          │  │
//! │  │ freeze: sign │    │ attempt loop │    │ Node: health + lazy channel │  │
//! │  │ per (chunk,  │    │ + backoff    │    └──────────────┬──────────────┘  │
//! │  │      node)   │    └──────────────┘                   │                 │
//! │  └──────────────┘                                       ▼                 │
//! │                                              ┌─────────────────────┐      │
//! │  ┌──────────────┐                            │ Connector / Channel │      │
//! │  │ ReceiptQuery │── (unbound: healthiest) ──►│ traits; in-process  │      │
//! │  └──────────────┘                            └─────────────────────┘      │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Model
//!
//! 1. **Transport failures** (unavailable, exhausted, stream reset) penalize
//!    the node and retry elsewhere after a jittered backoff
//! 2. **Busy statuses** retry after a backoff without penalizing the node
//! 3. Anything else is returned to the caller with its status
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ledger_client_engine::{Client, ClientConfig, InProcessConnector, Operation, Transaction};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ledger_client_engine::Result<()> {
//!     let config = ClientConfig::from_json_file("client.json")?;
//!     let client = Client::new(config, Arc::new(InProcessConnector::new())).await?;
//!
//!     let mut tx = Transaction::new(Operation::new("cryptoTransfer", b"...".to_vec()));
//!     let response = tx.execute(&client).await?;
//!     let receipt = response.get_receipt(&client).await?;
//!     println!("{}", receipt.status);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod execute;
pub mod ids;
pub mod metrics;
pub mod network;
pub mod node;
pub mod receipt;
pub mod status;
pub mod transaction;
pub mod transport;
pub mod wire;

// Re-exports for convenience
pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use client::{Client, ClientState, HealthCheck};
pub use config::{ChunkingConfig, ClientConfig, ExecutionConfig, NodeHealthConfig, SelectionConfig};
pub use error::{ClientError, ErrorKind, Result};
pub use execute::{Execute, ExecuteOptions, ExecutionState, Executor};
pub use ids::{AccountId, Timestamp, TransactionId};
pub use network::{Network, PoolUpdate};
pub use node::{Consensus, Mirror, Node, NodeAddress};
pub use receipt::ReceiptQuery;
pub use status::Status;
pub use transaction::{ChunkSettings, Operation, Signer, Transaction, TransactionResponse};
pub use transport::{Channel, Connector, InProcessConnector, TransportCode, TransportError};
