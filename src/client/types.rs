//! Client state types.
//!
//! Defines the client lifecycle and the health report.
//!
//! # State Transitions
//!
//! ```text
//!   Client::new()           close()                 (pools closed)
//! ─────────────────→ Open ───────────→ Closing ─────────────────────→ Closed
//!                                                                       │
//!                                           close() again: no-op ◄──────┘
//! ```
//!
//! - **Open**: pools are live; requests execute.
//! - **Closing**: `close()` is shutting the pools down; new requests fail.
//! - **Closed**: every connection is closed. Safe to drop.

use crate::ids::AccountId;

/// Lifecycle state of a [`Client`](super::Client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Open,
    Closing,
    Closed,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Open => "Open",
            ClientState::Closing => "Closing",
            ClientState::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health snapshot of one consensus node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHealth {
    pub node_id: AccountId,
    pub address: String,
    pub healthy: bool,
    /// Current delay window.
    pub delay_ms: u64,
    /// Time until the node is healthy again (0 when healthy).
    pub remaining_backoff_ms: u64,
    pub use_count: u64,
    pub failure_count: u64,
}

/// Point-in-time health of a client.
///
/// Collected from atomics and pool snapshots; performs no network I/O.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub state: ClientState,
    /// Open with at least one healthy consensus node.
    pub ready: bool,
    pub nodes_total: usize,
    pub nodes_healthy: usize,
    pub mirrors_total: usize,
    pub nodes: Vec<NodeHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_state_display() {
        assert_eq!(ClientState::Open.to_string(), "Open");
        assert_eq!(ClientState::Closing.to_string(), "Closing");
        assert_eq!(ClientState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_client_state_equality() {
        assert_eq!(ClientState::Open, ClientState::Open);
        assert_ne!(ClientState::Open, ClientState::Closed);
    }
}
