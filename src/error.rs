// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the client engine.
//!
//! Every failure a caller can observe is a [`ClientError`]. Each variant
//! belongs to exactly one [`ErrorKind`], and the execution loop decides
//! whether to retry purely from that kind.
//!
//! # Error Categories
//!
//! | Kind | Variants | Retried | Node penalty |
//! |------|----------|---------|--------------|
//! | `TransientTransport` | `Transport` (unavailable, exhausted, reset) | Yes | Yes |
//! | `TransientApplication` | `Status` (busy, not yet visible) | Yes | No |
//! | `TerminalTransport` | `Transport` (any other code) | No | - |
//! | `TerminalApplication` | `Precheck`, `ReceiptStatus` | No | - |
//! | `Programmer` | `Frozen`, `ScheduleForbidden`, `Config`, ... | No | - |
//! | `Teardown` | `Teardown` | Never surfaced | - |
//! | `Exhausted` | `MaxAttemptsExceeded`, `Timeout` | No | - |
//! | `Internal` | `Codec`, `Internal` | No | - |
//!
//! # Retry Behavior
//!
//! Retryable conditions never leave the execution engine. Callers see them
//! only as the `last` error inside [`ClientError::MaxAttemptsExceeded`] or
//! [`ClientError::Timeout`].

use crate::ids::TransactionId;
use crate::status::Status;
use crate::transport::TransportError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Taxonomy class of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientTransport,
    TransientApplication,
    TerminalTransport,
    TerminalApplication,
    Programmer,
    Teardown,
    Exhausted,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransientTransport => "transient_transport",
            Self::TransientApplication => "transient_application",
            Self::TerminalTransport => "terminal_transport",
            Self::TerminalApplication => "terminal_application",
            Self::Programmer => "programmer",
            Self::Teardown => "teardown",
            Self::Exhausted => "exhausted",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while building or executing requests.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport call to a node failed.
    ///
    /// Transient codes are retried against another node; any other code
    /// ends the request.
    #[error("Transport error from node {node}: {source}")]
    Transport {
        node: String,
        #[source]
        source: TransportError,
    },

    /// A replica answered with a retryable status.
    ///
    /// Only ever observed as the last error of an exhausted request.
    #[error("Node {node} returned retryable status {status}")]
    Status { node: String, status: Status },

    /// A replica rejected the request with a definitive status.
    #[error("Precheck failed with status {status}{}", fmt_tx_id(.transaction_id))]
    Precheck {
        status: Status,
        transaction_id: Option<TransactionId>,
    },

    /// The receipt reached a final status other than `SUCCESS`.
    #[error("Receipt for transaction {transaction_id} has status {status}")]
    ReceiptStatus {
        status: Status,
        transaction_id: TransactionId,
    },

    /// Mutation attempted on a frozen transaction.
    #[error("Transaction is immutable; it has been frozen")]
    Frozen,

    /// The transaction cannot be wrapped in a schedule.
    #[error("Cannot schedule transaction: {0}")]
    ScheduleForbidden(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A node address could not be parsed.
    #[error("Invalid node address {address:?}: {message}")]
    InvalidAddress { address: String, message: String },

    /// A string could not be parsed into an identifier.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Lifecycle state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// A request was bound to a node that is no longer in the pool.
    #[error("Node {0} is not in the network")]
    NodeNotFound(String),

    /// The pool has no nodes to select from.
    #[error("No nodes available in the {0} network")]
    NoNodes(&'static str),

    /// The client has been closed.
    #[error("Client is closed")]
    Shutdown,

    /// Closing a node connection failed. Logged, never returned from a request.
    #[error("Failed to close node {node}: {message}")]
    Teardown { node: String, message: String },

    /// The attempt ceiling was reached.
    #[error("Exceeded maximum attempts ({attempts}); last error: {last}")]
    MaxAttemptsExceeded {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    /// The overall request deadline passed.
    #[error("Request timed out after {elapsed:?}{}", fmt_last(.last))]
    Timeout {
        elapsed: Duration,
        last: Option<Box<ClientError>>,
    },

    /// One chunk of a chunked transaction failed; later chunks were not sent.
    #[error("Chunk {index} of {total} failed: {source}")]
    ChunkFailed {
        /// 0-based index of the failing chunk.
        index: usize,
        total: usize,
        #[source]
        source: Box<ClientError>,
    },

    /// Encoding or decoding a wire envelope failed.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_tx_id(id: &Option<TransactionId>) -> String {
    match id {
        Some(id) => format!(" for transaction {}", id),
        None => String::new(),
    }
}

fn fmt_last(last: &Option<Box<ClientError>>) -> String {
    match last {
        Some(err) => format!("; last error: {}", err),
        None => String::new(),
    }
}

impl ClientError {
    /// Create a transport error for `node`.
    pub fn transport(node: impl fmt::Display, source: TransportError) -> Self {
        Self::Transport {
            node: node.to_string(),
            source,
        }
    }

    /// Create an address error.
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a state machine violation error.
    pub fn invalid_state(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { source, .. } if source.is_transient() => ErrorKind::TransientTransport,
            Self::Transport { .. } => ErrorKind::TerminalTransport,
            Self::Status { .. } => ErrorKind::TransientApplication,
            Self::Precheck { .. } | Self::ReceiptStatus { .. } => ErrorKind::TerminalApplication,
            Self::Frozen
            | Self::ScheduleForbidden(_)
            | Self::Config(_)
            | Self::InvalidAddress { .. }
            | Self::Parse(_)
            | Self::InvalidState { .. }
            | Self::NodeNotFound(_)
            | Self::NoNodes(_)
            | Self::Shutdown => ErrorKind::Programmer,
            Self::Teardown { .. } => ErrorKind::Teardown,
            Self::MaxAttemptsExceeded { .. } | Self::Timeout { .. } => ErrorKind::Exhausted,
            Self::ChunkFailed { source, .. } => source.kind(),
            Self::Codec(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientTransport | ErrorKind::TransientApplication
        )
    }

    /// The status code carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Status { status, .. }
            | Self::Precheck { status, .. }
            | Self::ReceiptStatus { status, .. } => Some(*status),
            Self::ChunkFailed { source, .. } => source.status(),
            Self::MaxAttemptsExceeded { last, .. } => last.status(),
            _ => None,
        }
    }
}
