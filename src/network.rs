// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Node pools.
//!
//! A [`Network`] is the live set of [`Node`]s for one network (consensus or
//! mirror). It supports hot replacement of the node set and selects an
//! ordered subset of nodes for each logical request.
//!
//! # Consistency
//!
//! ```text
//!  readers ──read()──► Arc<NodeSet> ◄──swap── writer (holds gate permit)
//!                      ├── by_key:  key → node
//!                      └── ordered: [node]
//! ```
//!
//! The node set is an immutable snapshot. A mutation builds a complete new
//! snapshot and swaps it in while holding the single-permit gate, so a reader
//! sees the pool either entirely before or entirely after the mutation.
//! Readers never touch the gate, and removed nodes are closed only after the
//! permit is released.
//!
//! # Selection
//!
//! Nodes are ranked healthy-first, then by use count, then by last use (see
//! [`HealthSnapshot::selection_order`]). A request fans out to the first
//! `ceil(N / 3)` ranked nodes unless a fixed width is configured. Every node
//! counts once toward `N` regardless of health; health only affects order.
//!
//! # Parking
//!
//! With `max_node_attempts` set, a node that fails that many times in a row
//! is parked: it stays a member (bound requests still reach it) but drops
//! out of selection and out of `N`. Once its backoff has elapsed the next
//! selection readmits it with a clean strike count. Both moves happen in a
//! locked snapshot swap, like any other mutation.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::metrics;
use crate::node::{epoch_millis, HealthSnapshot, Node, NodeAddress, NodeBackoff, NodeKind};
use crate::transport::Connector;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Settings shared by every node of one pool.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub backoff: NodeBackoff,
    /// Shared deadline budget when closing nodes.
    pub close_timeout: Duration,
    /// Fixed fan-out width; `None` selects a third of the pool.
    pub max_nodes_per_request: Option<usize>,
    /// Consecutive failures that park a node; `None` disables parking.
    pub max_node_attempts: Option<u32>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            backoff: NodeBackoff::default(),
            close_timeout: Duration::from_secs(30),
            max_nodes_per_request: None,
            max_node_attempts: None,
        }
    }
}

impl NetworkSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            backoff: config.node_health.node_backoff(),
            close_timeout: config.node_health.close_timeout_duration(),
            max_nodes_per_request: config.selection.max_nodes_per_request,
            max_node_attempts: config.selection.max_node_attempts,
        }
    }
}

/// Outcome of a hot replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolUpdate {
    pub added: usize,
    pub removed: usize,
    pub kept: usize,
}

/// One consistent view of the pool.
struct NodeSet<K: NodeKind> {
    by_key: HashMap<K::Key, Arc<Node<K>>>,
    ordered: Vec<Arc<Node<K>>>,
    /// Members left out of selection after repeated failures
    parked: HashSet<K::Key>,
}

impl<K: NodeKind> NodeSet<K> {
    fn empty() -> Self {
        Self {
            by_key: HashMap::new(),
            ordered: Vec::new(),
            parked: HashSet::new(),
        }
    }

    fn selectable(&self) -> impl Iterator<Item = &Arc<Node<K>>> + '_ {
        self.ordered.iter().filter(move |node| !self.parked.contains(node.key()))
    }

    /// Whether parking or readmission would change this set at `now_ms`.
    fn needs_review(&self, limit: u64, now_ms: u64) -> bool {
        self.ordered.iter().any(|node| {
            if self.parked.contains(node.key()) {
                node.snapshot(now_ms).healthy
            } else {
                node.strikes() >= limit
            }
        })
    }

    /// Selectable nodes ranked for selection, all evaluated at the same instant.
    fn ranked(&self) -> Vec<Arc<Node<K>>> {
        let now = epoch_millis();
        let mut ranked: Vec<(HealthSnapshot, &Arc<Node<K>>)> =
            self.selectable().map(|node| (node.snapshot(now), node)).collect();
        ranked.sort_by(|a, b| a.0.selection_order(&b.0));
        ranked.into_iter().map(|(_, node)| node.clone()).collect()
    }
}

/// The live node set for one network.
pub struct Network<K: NodeKind> {
    nodes: RwLock<Arc<NodeSet<K>>>,
    /// Single-permit gate serializing mutations
    gate: Semaphore,
    connector: Arc<dyn Connector>,
    settings: NetworkSettings,
    closed: AtomicBool,
}

impl<K: NodeKind> Network<K> {
    /// Create an empty pool.
    pub fn new(connector: Arc<dyn Connector>, settings: NetworkSettings) -> Self {
        Self {
            nodes: RwLock::new(Arc::new(NodeSet::empty())),
            gate: Semaphore::new(1),
            connector,
            settings,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a pool holding `nodes`.
    pub async fn with_nodes(
        connector: Arc<dyn Connector>,
        settings: NetworkSettings,
        nodes: BTreeMap<K::Key, NodeAddress>,
    ) -> Result<Self> {
        let network = Self::new(connector, settings);
        network.set_nodes(nodes).await?;
        Ok(network)
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn snapshot(&self) -> Arc<NodeSet<K>> {
        self.nodes.read().await.clone()
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Replace the node set.
    ///
    /// Nodes whose key is gone, or whose address changed, are closed within
    /// one shared `close_timeout`. New keys get fresh nodes. Unchanged nodes
    /// keep their health state.
    pub async fn set_nodes(&self, nodes: BTreeMap<K::Key, NodeAddress>) -> Result<PoolUpdate> {
        let permit = self.acquire_gate().await?;
        self.apply_locked(permit, nodes).await
    }

    async fn acquire_gate(&self) -> Result<SemaphorePermit<'_>> {
        self.gate
            .acquire()
            .await
            .map_err(|_| ClientError::Internal("network gate closed".into()))
    }

    /// Swap in `nodes` while `permit` holds the gate, then close what left.
    async fn apply_locked(
        &self,
        permit: SemaphorePermit<'_>,
        nodes: BTreeMap<K::Key, NodeAddress>,
    ) -> Result<PoolUpdate> {
        if self.is_closed() {
            return Err(ClientError::invalid_state("open network", "closed network"));
        }

        let current = self.snapshot().await;
        let mut next = NodeSet::empty();
        let mut update = PoolUpdate::default();

        for (key, address) in nodes {
            let node = match current.by_key.get(&key) {
                Some(existing) if existing.address() == &address => {
                    update.kept += 1;
                    if current.parked.contains(&key) {
                        next.parked.insert(key.clone());
                    }
                    existing.clone()
                }
                _ => {
                    update.added += 1;
                    Arc::new(Node::new(key.clone(), address, self.settings.backoff, self.connector.clone()))
                }
            };
            next.ordered.push(node.clone());
            next.by_key.insert(key, node);
        }

        let removed: Vec<Arc<Node<K>>> = current
            .ordered
            .iter()
            .filter(|node| {
                next.by_key
                    .get(node.key())
                    .map_or(true, |kept| !Arc::ptr_eq(kept, node))
            })
            .cloned()
            .collect();
        update.removed = removed.len();

        let size = next.ordered.len();
        *self.nodes.write().await = Arc::new(next);
        drop(permit);

        metrics::set_pool_size(K::NAME, size);
        metrics::record_pool_update(K::NAME, update.added, update.removed);
        info!(
            network = K::NAME,
            added = update.added,
            removed = update.removed,
            kept = update.kept,
            size,
            "Updated node set"
        );

        self.close_nodes(removed).await;
        Ok(update)
    }

    /// Move every node to the TLS (or plaintext) port of its network's pair.
    ///
    /// Nodes whose address changes are replaced, so their health resets.
    pub async fn set_transport_security(&self, secure: bool) -> Result<PoolUpdate> {
        let permit = self.acquire_gate().await?;
        let current = self.snapshot().await;
        let nodes = current
            .ordered
            .iter()
            .map(|node| {
                let address = if secure {
                    node.address().swap_port(K::PLAIN_PORT, K::TLS_PORT)
                } else {
                    node.address().swap_port(K::TLS_PORT, K::PLAIN_PORT)
                };
                (node.key().clone(), address)
            })
            .collect();
        self.apply_locked(permit, nodes).await
    }

    /// Park members at the strike limit and readmit parked members whose
    /// backoff has elapsed.
    async fn review_membership(&self) -> Result<()> {
        let Some(limit) = self.settings.max_node_attempts.map(u64::from) else {
            return Ok(());
        };
        if !self.snapshot().await.needs_review(limit, epoch_millis()) {
            return Ok(());
        }

        let permit = self.acquire_gate().await?;
        if self.is_closed() {
            return Ok(());
        }
        let current = self.snapshot().await;
        let now = epoch_millis();
        let mut parked = HashSet::new();
        let mut newly_parked = Vec::new();
        let mut readmitted = Vec::new();

        for node in &current.ordered {
            let key = node.key();
            if current.parked.contains(key) {
                if node.snapshot(now).healthy {
                    node.clear_strikes();
                    readmitted.push(key.to_string());
                } else {
                    parked.insert(key.clone());
                }
            } else if node.strikes() >= limit {
                parked.insert(key.clone());
                newly_parked.push(key.to_string());
            }
        }
        if newly_parked.is_empty() && readmitted.is_empty() {
            return Ok(());
        }

        *self.nodes.write().await = Arc::new(NodeSet {
            by_key: current.by_key.clone(),
            ordered: current.ordered.clone(),
            parked,
        });
        drop(permit);

        if !newly_parked.is_empty() {
            metrics::record_nodes_parked(K::NAME, newly_parked.len());
            warn!(network = K::NAME, nodes = ?newly_parked, limit, "Parked failing nodes");
        }
        if !readmitted.is_empty() {
            metrics::record_nodes_readmitted(K::NAME, readmitted.len());
            info!(network = K::NAME, nodes = ?readmitted, "Readmitted parked nodes");
        }
        Ok(())
    }

    async fn close_nodes(&self, nodes: Vec<Arc<Node<K>>>) {
        if nodes.is_empty() {
            return;
        }
        let deadline = Instant::now() + self.settings.close_timeout;
        futures::future::join_all(nodes.iter().map(|node| node.close(deadline))).await;
        debug!(network = K::NAME, count = nodes.len(), "Closed removed nodes");
    }

    /// Close every node and clear the pool. Later calls do nothing.
    pub async fn close(&self) {
        let Ok(permit) = self.gate.acquire().await else {
            return;
        };
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let current = {
            let mut nodes = self.nodes.write().await;
            std::mem::replace(&mut *nodes, Arc::new(NodeSet::empty()))
        };
        drop(permit);

        metrics::set_pool_size(K::NAME, 0);
        info!(network = K::NAME, nodes = current.ordered.len(), "Closing network");
        self.close_nodes(current.ordered.clone()).await;
    }

    // =========================================================================
    // Lookup and selection
    // =========================================================================

    pub async fn len(&self) -> usize {
        self.snapshot().await.ordered.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get a node by key.
    pub async fn node(&self, key: &K::Key) -> Option<Arc<Node<K>>> {
        self.snapshot().await.by_key.get(key).cloned()
    }

    /// All nodes in pool order.
    pub async fn nodes(&self) -> Vec<Arc<Node<K>>> {
        self.snapshot().await.ordered.clone()
    }

    /// Current key → address mapping.
    pub async fn addresses(&self) -> BTreeMap<K::Key, NodeAddress> {
        self.snapshot()
            .await
            .ordered
            .iter()
            .map(|node| (node.key().clone(), node.address().clone()))
            .collect()
    }

    /// Number of nodes a request fans out to for a pool of `total` nodes.
    pub fn nodes_for_request(&self, total: usize) -> usize {
        match self.settings.max_nodes_per_request {
            Some(width) => width.min(total),
            None => total.div_ceil(3),
        }
    }

    fn ensure_usable(&self, set: &NodeSet<K>) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Shutdown);
        }
        if set.ordered.is_empty() {
            return Err(ClientError::NoNodes(K::NAME));
        }
        Ok(())
    }

    /// Keys of the nodes a new request should fan out to, best first.
    pub async fn select_nodes_for_execute(&self) -> Result<Vec<K::Key>> {
        self.review_membership().await?;
        let set = self.snapshot().await;
        self.ensure_usable(&set)?;

        let ranked = set.ranked();
        if ranked.is_empty() {
            return Err(ClientError::NoNodes(K::NAME));
        }
        let count = self.nodes_for_request(ranked.len());
        let selected: Vec<K::Key> = ranked
            .into_iter()
            .take(count)
            .map(|node| node.key().clone())
            .collect();

        debug!(
            network = K::NAME,
            total = set.ordered.len(),
            parked = set.parked.len(),
            count,
            "Selected nodes"
        );
        Ok(selected)
    }

    /// The single best node right now.
    pub async fn healthiest(&self) -> Result<Arc<Node<K>>> {
        self.review_membership().await?;
        let set = self.snapshot().await;
        self.ensure_usable(&set)?;
        set.ranked()
            .into_iter()
            .next()
            .ok_or(ClientError::NoNodes(K::NAME))
    }

    /// Members currently parked, in pool order.
    pub async fn parked(&self) -> Vec<K::Key> {
        let set = self.snapshot().await;
        set.ordered
            .iter()
            .filter(|node| set.parked.contains(node.key()))
            .map(|node| node.key().clone())
            .collect()
    }
}
