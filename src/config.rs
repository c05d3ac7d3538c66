//! Configuration for the client engine.
//!
//! This module defines all configuration types needed to build a
//! [`Client`](crate::Client). Configuration can be constructed
//! programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use ledger_client_engine::config::ClientConfig;
//!
//! let mut config = ClientConfig::default();
//! config.network.insert("0.0.3".into(), "35.237.200.180:50211".into());
//! config.operator_account_id = Some("0.0.1001".into());
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ClientConfig
//! ├── network: account id → address   # Consensus replicas
//! ├── mirror_network: [address]       # Read-only mirror replicas
//! ├── operator_account_id             # Default payer
//! ├── transport_security: bool        # Rewrite well-known ports to TLS
//! ├── execution: ExecutionConfig      # Attempt loop bounds and backoff
//! ├── node_health: NodeHealthConfig   # Per-node delay window
//! ├── selection: SelectionConfig      # Fan-out width, node parking
//! └── chunking: ChunkingConfig        # Oversized payload splitting
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "network": { "0.0.3": "35.237.200.180:50211", "0.0.4": "35.186.191.247:50211" },
//!   "mirror_network": ["mainnet-public.mirrornode.hedera.com:443"],
//!   "operator_account_id": "0.0.1001",
//!   "execution": { "max_attempts": 5, "request_timeout": "30s" },
//!   "chunking": { "chunk_size": 2048 }
//! }
//! ```

use crate::error::{ClientError, Result};
use crate::node::{NodeAddress, NodeBackoff};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config: passed to Client::new()
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `Client::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Consensus replicas, keyed by node account id.
    #[serde(default)]
    pub network: BTreeMap<String, String>,

    /// Mirror replicas (addresses only; the address is the identity).
    #[serde(default)]
    pub mirror_network: Vec<String>,

    /// Account that pays for transactions when none is set explicitly.
    #[serde(default)]
    pub operator_account_id: Option<String>,

    /// Move well-known plaintext ports to their TLS counterparts.
    #[serde(default)]
    pub transport_security: bool,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub node_health: NodeHealthConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl ClientConfig {
    /// Create a config with fast timings for tests.
    ///
    /// `nodes` is a list of `(account id, address)` pairs.
    pub fn for_testing(nodes: &[(&str, &str)]) -> Self {
        Self {
            network: nodes
                .iter()
                .map(|(id, addr)| (id.to_string(), addr.to_string()))
                .collect(),
            mirror_network: Vec::new(),
            operator_account_id: Some("0.0.1001".to_string()),
            transport_security: false,
            execution: ExecutionConfig::for_testing(),
            node_health: NodeHealthConfig::for_testing(),
            selection: SelectionConfig::default(),
            chunking: ChunkingConfig::default(),
        }
    }

    /// Parse a config from a JSON string and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check the whole config for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (id, address) in &self.network {
            if id.is_empty() {
                return Err(ClientError::Config(format!("empty node account id for {}", address)));
            }
            address.parse::<NodeAddress>()?;
        }
        for address in &self.mirror_network {
            address.parse::<NodeAddress>()?;
        }
        self.execution.validate()?;
        self.node_health.validate()?;
        self.selection.validate()?;
        self.chunking.validate()?;
        Ok(())
    }
}

/// Parse a humantime duration string, naming the field on failure.
fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ClientError::Config(format!("{} = {:?}: {}", field, value, e)))
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// ExecutionConfig: attempt loop bounds
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounds and backoff for the execution attempt loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum attempts per request before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the jittered exponential backoff between attempts.
    #[serde(default = "default_min_backoff")]
    pub min_backoff: String,

    /// Cap on a single backoff delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,

    /// Whether `max_backoff` is enforced. Off reproduces unbounded jitter.
    #[serde(default = "default_true")]
    pub cap_backoff: bool,

    /// Overall deadline for one request, across all attempts.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Deadline for a single transport call.
    #[serde(default = "default_grpc_deadline")]
    pub grpc_deadline: String,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_min_backoff() -> String {
    "250ms".to_string()
}

fn default_max_backoff() -> String {
    "8s".to_string()
}

fn default_request_timeout() -> String {
    "2m".to_string()
}

fn default_grpc_deadline() -> String {
    "10s".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff: default_min_backoff(),
            max_backoff: default_max_backoff(),
            cap_backoff: true,
            request_timeout: default_request_timeout(),
            grpc_deadline: default_grpc_deadline(),
        }
    }
}

impl ExecutionConfig {
    /// Fast-fail settings for tests.
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: "1ms".to_string(),
            max_backoff: "10ms".to_string(),
            cap_backoff: true,
            request_timeout: "10s".to_string(),
            grpc_deadline: "2s".to_string(),
        }
    }

    pub fn min_backoff_duration(&self) -> Duration {
        humantime::parse_duration(&self.min_backoff).unwrap_or(Duration::from_millis(250))
    }

    /// The backoff cap, or `None` when capping is disabled.
    pub fn max_backoff_duration(&self) -> Option<Duration> {
        self.cap_backoff
            .then(|| humantime::parse_duration(&self.max_backoff).unwrap_or(Duration::from_secs(8)))
    }

    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(120))
    }

    pub fn grpc_deadline_duration(&self) -> Duration {
        humantime::parse_duration(&self.grpc_deadline).unwrap_or(Duration::from_secs(10))
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ClientError::Config("execution.max_attempts must be at least 1".into()));
        }
        let min = parse_duration("execution.min_backoff", &self.min_backoff)?;
        let max = parse_duration("execution.max_backoff", &self.max_backoff)?;
        if min > max {
            return Err(ClientError::Config(format!(
                "execution.min_backoff ({:?}) exceeds execution.max_backoff ({:?})",
                min, max
            )));
        }
        parse_duration("execution.request_timeout", &self.request_timeout)?;
        parse_duration("execution.grpc_deadline", &self.grpc_deadline)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NodeHealthConfig: per-node delay window
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-node health scoring and teardown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealthConfig {
    /// Floor of a node's delay window; also its starting value.
    #[serde(default = "default_min_node_backoff")]
    pub min_node_backoff: String,

    /// Ceiling of a node's delay window.
    #[serde(default = "default_max_node_backoff")]
    pub max_node_backoff: String,

    /// Shared budget for closing removed nodes.
    #[serde(default = "default_close_timeout")]
    pub close_timeout: String,
}

fn default_min_node_backoff() -> String {
    "250ms".to_string()
}

fn default_max_node_backoff() -> String {
    "8s".to_string()
}

fn default_close_timeout() -> String {
    "30s".to_string()
}

impl Default for NodeHealthConfig {
    fn default() -> Self {
        Self {
            min_node_backoff: default_min_node_backoff(),
            max_node_backoff: default_max_node_backoff(),
            close_timeout: default_close_timeout(),
        }
    }
}

impl NodeHealthConfig {
    pub fn for_testing() -> Self {
        Self {
            min_node_backoff: "250ms".to_string(),
            max_node_backoff: "8s".to_string(),
            close_timeout: "1s".to_string(),
        }
    }

    /// The delay window bounds handed to every node.
    pub fn node_backoff(&self) -> NodeBackoff {
        NodeBackoff {
            min: humantime::parse_duration(&self.min_node_backoff).unwrap_or(Duration::from_millis(250)),
            max: humantime::parse_duration(&self.max_node_backoff).unwrap_or(Duration::from_secs(8)),
        }
    }

    pub fn close_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.close_timeout).unwrap_or(Duration::from_secs(30))
    }

    fn validate(&self) -> Result<()> {
        let min = parse_duration("node_health.min_node_backoff", &self.min_node_backoff)?;
        let max = parse_duration("node_health.max_node_backoff", &self.max_node_backoff)?;
        if min.is_zero() || min > max {
            return Err(ClientError::Config(format!(
                "node_health backoff window must satisfy 0 < min ({:?}) <= max ({:?})",
                min, max
            )));
        }
        parse_duration("node_health.close_timeout", &self.close_timeout)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SelectionConfig: fan-out width and failing-node parking
// ═══════════════════════════════════════════════════════════════════════════════

/// How many nodes a single logical request fans out to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Fixed fan-out width. `None` selects a third of the pool, rounded up.
    #[serde(default)]
    pub max_nodes_per_request: Option<usize>,

    /// Consecutive failures after which a node leaves selection until its
    /// backoff elapses. `None` never parks nodes.
    #[serde(default)]
    pub max_node_attempts: Option<u32>,
}

impl SelectionConfig {
    fn validate(&self) -> Result<()> {
        if self.max_nodes_per_request == Some(0) {
            return Err(ClientError::Config("selection.max_nodes_per_request must be at least 1".into()));
        }
        if self.max_node_attempts == Some(0) {
            return Err(ClientError::Config("selection.max_node_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ChunkingConfig: oversized payloads
// ═══════════════════════════════════════════════════════════════════════════════

/// Defaults for splitting oversized payloads into chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum payload bytes per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum number of chunks one operation may produce.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

fn default_chunk_size() -> usize {
    1024
}

fn default_max_chunks() -> usize {
    20
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.max_chunks == 0 {
            return Err(ClientError::Config("chunking.chunk_size and chunking.max_chunks must be at least 1".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
