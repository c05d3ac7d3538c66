// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport integration traits.
//!
//! The engine never speaks a wire protocol itself. It needs exactly two
//! things from the transport layer:
//!
//! 1. A [`Connector`] that turns a [`NodeAddress`] into a [`Channel`].
//! 2. A [`Channel`] that sends one pre-serialized request and awaits one
//!    response (or a [`TransportError`]).
//!
//! The crate ships one implementation, [`InProcessConnector`], which routes
//! addresses to channels registered in memory. A network transport plugs in
//! by implementing both traits.
//!
//! # Example
//!
//! ```rust,no_run
//! use ledger_client_engine::transport::{BoxFuture, Channel, InProcessConnector, TransportError};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Channel for Echo {
//!     fn unary<'a>(&'a self, _method: &'a str, request: Vec<u8>) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
//!         Box::pin(async move { Ok(request) })
//!     }
//!
//!     fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//!
//! let connector = InProcessConnector::new();
//! connector.register("echo", Arc::new(Echo));
//! ```

use crate::node::NodeAddress;
use dashmap::DashMap;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport-level status of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportCode {
    /// The peer is unreachable or refused the connection.
    Unavailable,
    /// The peer is out of some resource (rate limited, queue full).
    ResourceExhausted,
    /// The peer or the connection hit an internal failure.
    Internal,
    /// The per-call deadline passed before a response arrived.
    DeadlineExceeded,
    /// The call was cancelled (e.g. the connection was closed under it).
    Cancelled,
    PermissionDenied,
    Unimplemented,
    Unknown,
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Internal => "INTERNAL",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Error returned by a [`Channel`] or [`Connector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub code: TransportCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: TransportCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportCode::Unavailable, message)
    }

    /// Whether the call may succeed against another node or later.
    ///
    /// `INTERNAL` only counts when the connection was reset mid-stream.
    pub fn is_transient(&self) -> bool {
        match self.code {
            TransportCode::Unavailable | TransportCode::ResourceExhausted => true,
            TransportCode::Internal => is_stream_reset(&self.message),
            _ => false,
        }
    }
}

/// `rst`, one separator, then `stream`, as whole words in any case.
const STREAM_RESET_PATTERN: &str = r"(?i)\brst[^0-9a-zA-Z]stream\b";

fn is_stream_reset(message: &str) -> bool {
    static STREAM_RESET: OnceLock<Option<Regex>> = OnceLock::new();
    STREAM_RESET
        .get_or_init(|| Regex::new(STREAM_RESET_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TransportError {}

/// A persistent, multiplexed connection to one node.
///
/// Cloning the `Arc` is cheap; concurrent calls share the connection.
pub trait Channel: Send + Sync + 'static {
    /// Send one request on `method` and await its response.
    fn unary<'a>(
        &'a self,
        method: &'a str,
        request: Vec<u8>,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>>;

    /// Gracefully shut the connection down.
    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Builds channels for node addresses.
///
/// Channel creation must not block; connecting happens on first call.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, address: &NodeAddress, tls: bool) -> Result<Arc<dyn Channel>, TransportError>;
}

/// Routes addresses to channels registered in memory.
///
/// `in-process:<name>` resolves to the channel registered as `<name>`,
/// `host:port` to the one registered as `host:port`.
#[derive(Default)]
pub struct InProcessConnector {
    channels: DashMap<String, Arc<dyn Channel>>,
}

impl InProcessConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` under `route`.
    pub fn register(&self, route: impl Into<String>, channel: Arc<dyn Channel>) {
        self.channels.insert(route.into(), channel);
    }

    /// Remove the channel registered under `route`.
    pub fn unregister(&self, route: &str) -> Option<Arc<dyn Channel>> {
        self.channels.remove(route).map(|(_, ch)| ch)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Connector for InProcessConnector {
    fn connect(&self, address: &NodeAddress, _tls: bool) -> Result<Arc<dyn Channel>, TransportError> {
        let route = match address {
            NodeAddress::InProcess { name } => name.clone(),
            NodeAddress::Host { .. } => address.to_string(),
        };
        self.channels
            .get(&route)
            .map(|r| r.value().clone())
            .ok_or_else(|| TransportError::unavailable(format!("no channel registered for {}", route)))
    }
}
