//! Node flavors.
//!
//! Consensus replicas and mirror replicas share one [`Node`](super::Node)
//! type; what differs is captured here: how a node is identified and which
//! well-known port pair its network uses.

use super::address::{PORT_MIRROR_PLAIN, PORT_MIRROR_TLS, PORT_NODE_PLAIN, PORT_NODE_TLS};
use crate::ids::AccountId;
use std::fmt;
use std::hash::Hash;

/// Capability that specializes a [`Node`](super::Node).
pub trait NodeKind: Send + Sync + 'static {
    /// Identity of a node within its pool.
    type Key: Clone + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Short name used in logs and metric labels.
    const NAME: &'static str;

    /// Plaintext port of the well-known pair.
    const PLAIN_PORT: u16;

    /// TLS port of the well-known pair.
    const TLS_PORT: u16;
}

/// Consensus replica: accepts transactions and queries, keyed by account id.
#[derive(Debug, Clone, Copy)]
pub struct Consensus;

impl NodeKind for Consensus {
    type Key = AccountId;
    const NAME: &'static str = "consensus";
    const PLAIN_PORT: u16 = PORT_NODE_PLAIN;
    const TLS_PORT: u16 = PORT_NODE_TLS;
}

/// Read-only mirror replica, keyed by its address.
#[derive(Debug, Clone, Copy)]
pub struct Mirror;

impl NodeKind for Mirror {
    type Key = String;
    const NAME: &'static str = "mirror";
    const PLAIN_PORT: u16 = PORT_MIRROR_PLAIN;
    const TLS_PORT: u16 = PORT_MIRROR_TLS;
}
