//! Replica nodes and their health model.
//!
//! A [`Node`] is one replica endpoint: its address, a lazily created
//! connection, usage counters and a delay window that scores its health.
//!
//! # Health Model
//!
//! ```text
//!            on_failure()                         on_success()
//!  delay_until = now + delay              delay = max(delay / 2, min)
//!  delay = min(delay * 2, max)
//!
//!  ───────────────┬──────────────────────┬──────────────────────▶ time
//!             failure              delay_until
//!                 │◄──── unhealthy ─────►│◄──── healthy ────
//! ```
//!
//! Health recovers gradually: one success halves the window instead of
//! resetting it, so a flapping node stays deprioritized.
//!
//! # Connection Lifecycle
//!
//! Connections are **lazy**: the channel is created on the first call to
//! [`Node::channel()`] and memoized until [`Node::close()`]. TLS is chosen
//! from the address's port (see [`address`]).
//!
//! # Concurrency
//!
//! Several in-flight requests may target the same node. All counters are
//! atomics; the channel slot sits behind a `tokio::sync::RwLock`.

pub mod address;
mod kind;

pub use address::NodeAddress;
pub use kind::{Consensus, Mirror, NodeKind};

use crate::error::ClientError;
use crate::metrics;
use crate::transport::{Channel, Connector, TransportError};
use std::cmp::Ordering as CmpOrdering;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Bounds of a node's delay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeBackoff {
    /// Starting value and floor.
    pub min: Duration,
    /// Ceiling.
    pub max: Duration,
}

impl Default for NodeBackoff {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(250),
            max: Duration::from_secs(8),
        }
    }
}

/// Point-in-time view of a node's health, used for ordering.
///
/// Sorting compares snapshots taken at one instant, so the order stays a
/// strict weak ordering even while other tasks update the live counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub use_count: u64,
    pub last_used_ms: u64,
    pub delay_until_ms: u64,
}

impl HealthSnapshot {
    /// Selection order: healthy first, then least used, then least recently used.
    pub fn selection_order(&self, other: &Self) -> CmpOrdering {
        other
            .healthy
            .cmp(&self.healthy)
            .then(self.use_count.cmp(&other.use_count))
            .then(self.last_used_ms.cmp(&other.last_used_ms))
    }
}

/// A single replica endpoint.
pub struct Node<K: NodeKind> {
    key: K::Key,
    address: NodeAddress,
    backoff: NodeBackoff,
    connector: Arc<dyn Connector>,
    /// Lazily created channel (None until first use or after close).
    channel: RwLock<Option<Arc<dyn Channel>>>,
    /// Current delay window in milliseconds
    delay_ms: AtomicU64,
    /// Epoch millis before which the node is unhealthy
    delay_until_ms: AtomicU64,
    use_count: AtomicU64,
    last_used_ms: AtomicU64,
    /// Total transient failures observed
    failure_count: AtomicU64,
    /// Failures since the last success or readmission
    strikes: AtomicU64,
    closed: AtomicBool,
    _kind: PhantomData<K>,
}

impl<K: NodeKind> Node<K> {
    /// Create a node (not yet connected).
    pub fn new(key: K::Key, address: NodeAddress, backoff: NodeBackoff, connector: Arc<dyn Connector>) -> Self {
        Self {
            key,
            address,
            backoff,
            connector,
            channel: RwLock::new(None),
            delay_ms: AtomicU64::new(duration_millis(backoff.min)),
            delay_until_ms: AtomicU64::new(0),
            use_count: AtomicU64::new(0),
            last_used_ms: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            strikes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            _kind: PhantomData,
        }
    }

    pub fn key(&self) -> &K::Key {
        &self.key
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Current delay window.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Acquire))
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Acquire)
    }

    pub fn last_used_ms(&self) -> u64 {
        self.last_used_ms.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Transient failures since the last success or readmission.
    pub fn strikes(&self) -> u64 {
        self.strikes.load(Ordering::Acquire)
    }

    /// Forget past strikes when the node is let back into selection.
    pub(crate) fn clear_strikes(&self) {
        self.strikes.store(0, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Record that a request is being sent to this node.
    pub fn mark_used(&self) {
        self.use_count.fetch_add(1, Ordering::AcqRel);
        self.last_used_ms.store(epoch_millis(), Ordering::Release);
    }

    /// True once the current delay window has passed.
    pub fn is_healthy(&self) -> bool {
        epoch_millis() >= self.delay_until_ms.load(Ordering::Acquire)
    }

    /// Time left until the node is healthy again.
    pub fn remaining_backoff(&self) -> Duration {
        let until = self.delay_until_ms.load(Ordering::Acquire);
        Duration::from_millis(until.saturating_sub(epoch_millis()))
    }

    /// Penalize the node after a transient failure.
    pub fn on_failure(&self) {
        let max = duration_millis(self.backoff.max);
        let previous = self
            .delay_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_mul(2).min(max)))
            .unwrap_or_else(|d| d);
        self.delay_until_ms
            .store(epoch_millis().saturating_add(previous), Ordering::Release);
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        self.strikes.fetch_add(1, Ordering::AcqRel);

        let next = self.delay();
        debug!(
            network = K::NAME,
            node = %self.key,
            unhealthy_for_ms = previous,
            next_delay_ms = next.as_millis() as u64,
            failures,
            "Node marked unhealthy"
        );
        metrics::record_node_failure(K::NAME, &self.key.to_string(), next);
    }

    /// Reward the node after a successful response.
    pub fn on_success(&self) {
        let min = duration_millis(self.backoff.min);
        let _ = self
            .delay_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some((d / 2).max(min)));
        self.strikes.store(0, Ordering::Release);
        metrics::record_node_success(K::NAME, &self.key.to_string(), self.delay());
    }

    /// Health snapshot as of `now_ms`.
    pub fn snapshot(&self, now_ms: u64) -> HealthSnapshot {
        let delay_until_ms = self.delay_until_ms.load(Ordering::Acquire);
        HealthSnapshot {
            healthy: now_ms >= delay_until_ms,
            use_count: self.use_count(),
            last_used_ms: self.last_used_ms(),
            delay_until_ms,
        }
    }

    /// Selection order between two nodes, evaluated at one instant.
    pub fn compare(a: &Self, b: &Self) -> CmpOrdering {
        let now = epoch_millis();
        a.snapshot(now).selection_order(&b.snapshot(now))
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Get the node's channel, creating it on first use.
    pub async fn channel(&self) -> Result<Arc<dyn Channel>, TransportError> {
        // Fast path: already connected
        if let Some(channel) = self.channel.read().await.as_ref() {
            return Ok(channel.clone());
        }

        let mut slot = self.channel.write().await;
        if let Some(channel) = slot.as_ref() {
            return Ok(channel.clone());
        }
        if self.is_closed() {
            return Err(TransportError::unavailable(format!("node {} is closed", self.key)));
        }

        let tls = self.address.is_transport_security();
        let channel = self.connector.connect(&self.address, tls)?;
        debug!(network = K::NAME, node = %self.key, address = %self.address, tls, "Opened channel");
        *slot = Some(channel.clone());
        Ok(channel)
    }

    /// Close the channel, giving it until `deadline` to shut down.
    ///
    /// Failures are logged and swallowed.
    pub async fn close(&self, deadline: Instant) {
        self.closed.store(true, Ordering::Release);
        let Some(channel) = self.channel.write().await.take() else {
            return;
        };

        match timeout_at(deadline, channel.close()).await {
            Ok(Ok(())) => {
                debug!(network = K::NAME, node = %self.key, "Closed channel");
            }
            Ok(Err(e)) => {
                let err = ClientError::Teardown {
                    node: self.key.to_string(),
                    message: e.to_string(),
                };
                warn!(network = K::NAME, error = %err, "Channel close failed");
            }
            Err(_) => {
                let err = ClientError::Teardown {
                    node: self.key.to_string(),
                    message: "close deadline exceeded".to_string(),
                };
                warn!(network = K::NAME, error = %err, "Channel close timed out");
            }
        }
    }
}

impl<K: NodeKind> std::fmt::Debug for Node<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("network", &K::NAME)
            .field("key", &self.key)
            .field("address", &self.address)
            .field("delay_ms", &self.delay_ms.load(Ordering::Relaxed))
            .field("use_count", &self.use_count.load(Ordering::Relaxed))
            .finish()
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Get current epoch milliseconds.
pub(crate) fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
