// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The client.
//!
//! A [`Client`] owns everything a request needs:
//! - The consensus [`Network`] and the mirror [`Network`]
//! - The operator (default payer and signer)
//! - The [`Executor`] with its backoff policy and ceilings
//!
//! # Lifecycle
//!
//! 1. `Client::new(config, connector)` validates the config and fills both pools
//! 2. Requests run through [`Client::execute`] while the client is `Open`
//! 3. `close()` shuts both pools down within one `close_timeout` budget
//!
//! The pools can be replaced at any time with [`Client::set_network`] and
//! [`Client::set_mirror_network`]; in-flight requests are not disturbed.

mod types;

pub use types::{ClientState, HealthCheck, NodeHealth};

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::execute::{Execute, ExecuteOptions, Executor};
use crate::ids::AccountId;
use crate::metrics;
use crate::network::{Network, NetworkSettings, PoolUpdate};
use crate::node::{Consensus, Mirror, NodeAddress, NodeKind};
use crate::transaction::Signer;
use crate::transport::{Channel, Connector};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Entry point for talking to a ledger network.
pub struct Client {
    config: ClientConfig,
    network: Arc<Network<Consensus>>,
    mirror_network: Arc<Network<Mirror>>,
    executor: Executor,
    operator_account_id: Option<AccountId>,
    operator_signer: Option<Arc<dyn Signer>>,
    /// Applied to addresses passed to `set_network`/`set_mirror_network`
    transport_security: AtomicBool,
    state_tx: watch::Sender<ClientState>,
    state_rx: watch::Receiver<ClientState>,
}

impl Client {
    /// Create a client with the backoff described by `config.execution`.
    pub async fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let backoff = ExponentialBackoff::new(
            config.execution.min_backoff_duration(),
            config.execution.max_backoff_duration(),
        );
        Self::with_backoff(config, connector, Arc::new(backoff)).await
    }

    /// Create a client with a custom backoff policy.
    pub async fn with_backoff(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> Result<Self> {
        config.validate()?;

        let tls = config.transport_security;
        let settings = NetworkSettings::from_config(&config);
        let network = Arc::new(Network::new(connector.clone(), settings.clone()));
        let mirror_network = Arc::new(Network::new(connector, settings));
        network.set_nodes(consensus_nodes(&config.network, tls)?).await?;
        mirror_network.set_nodes(mirror_nodes(&config.mirror_network, tls)?).await?;

        let operator_account_id = config.operator_account_id.as_deref().map(AccountId::new);
        let executor = Executor::new(network.clone(), backoff, ExecuteOptions::from_config(&config.execution));
        let (state_tx, state_rx) = watch::channel(ClientState::Open);

        metrics::set_client_state(ClientState::Open.as_str());
        info!(
            nodes = config.network.len(),
            mirrors = config.mirror_network.len(),
            operator = ?operator_account_id,
            transport_security = tls,
            "Client open"
        );

        Ok(Self {
            config,
            network,
            mirror_network,
            executor,
            operator_account_id,
            operator_signer: None,
            transport_security: AtomicBool::new(tls),
            state_tx,
            state_rx,
        })
    }

    /// Set the operator: default payer and an extra signer on every transaction.
    pub fn with_operator(mut self, account_id: AccountId, signer: Arc<dyn Signer>) -> Self {
        self.set_operator(account_id, signer);
        self
    }

    pub fn set_operator(&mut self, account_id: AccountId, signer: Arc<dyn Signer>) {
        self.operator_account_id = Some(account_id);
        self.operator_signer = Some(signer);
    }

    pub fn operator_account_id(&self) -> Option<&AccountId> {
        self.operator_account_id.as_ref()
    }

    pub fn operator_signer(&self) -> Option<&Arc<dyn Signer>> {
        self.operator_signer.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<Network<Consensus>> {
        &self.network
    }

    pub fn mirror_network(&self) -> &Arc<Network<Mirror>> {
        &self.mirror_network
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Get current client state.
    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() != ClientState::Open {
            return Err(ClientError::Shutdown);
        }
        Ok(())
    }

    // =========================================================================
    // Pools
    // =========================================================================

    /// Replace the consensus nodes (account id → address).
    pub async fn set_network(&self, network: BTreeMap<String, String>) -> Result<PoolUpdate> {
        self.ensure_open()?;
        let tls = self.transport_security.load(Ordering::Acquire);
        self.network.set_nodes(consensus_nodes(&network, tls)?).await
    }

    /// Replace the mirror nodes.
    pub async fn set_mirror_network(&self, addresses: Vec<String>) -> Result<PoolUpdate> {
        self.ensure_open()?;
        let tls = self.transport_security.load(Ordering::Acquire);
        self.mirror_network.set_nodes(mirror_nodes(&addresses, tls)?).await
    }

    /// Move both pools to TLS ports (or back to plaintext).
    pub async fn set_transport_security(&self, secure: bool) -> Result<()> {
        self.ensure_open()?;
        self.transport_security.store(secure, Ordering::Release);
        self.network.set_transport_security(secure).await?;
        self.mirror_network.set_transport_security(secure).await?;
        Ok(())
    }

    /// Channel to the healthiest mirror node.
    pub async fn mirror_channel(&self) -> Result<Arc<dyn Channel>> {
        self.ensure_open()?;
        let node = self.mirror_network.healthiest().await?;
        node.mark_used();
        node.channel().await.map_err(|e| ClientError::transport(node.key(), e))
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub async fn execute<E: Execute>(&self, request: &E) -> Result<E::Output> {
        self.ensure_open()?;
        self.executor.execute(request).await
    }

    pub async fn execute_with<E: Execute>(&self, request: &E, options: &ExecuteOptions) -> Result<E::Output> {
        self.ensure_open()?;
        self.executor.execute_with(request, options).await
    }

    /// Health report for monitoring. Performs no network I/O.
    pub async fn health_check(&self) -> HealthCheck {
        let state = self.state();
        let nodes: Vec<NodeHealth> = self
            .network
            .nodes()
            .await
            .iter()
            .map(|node| NodeHealth {
                node_id: node.key().clone(),
                address: node.address().to_string(),
                healthy: node.is_healthy(),
                delay_ms: node.delay().as_millis() as u64,
                remaining_backoff_ms: node.remaining_backoff().as_millis() as u64,
                use_count: node.use_count(),
                failure_count: node.failure_count(),
            })
            .collect();
        let nodes_healthy = nodes.iter().filter(|n| n.healthy).count();

        HealthCheck {
            state,
            ready: state == ClientState::Open && nodes_healthy > 0,
            nodes_total: nodes.len(),
            nodes_healthy,
            mirrors_total: self.mirror_network.len().await,
            nodes,
        }
    }

    /// Close both pools. Later calls do nothing.
    pub async fn close(&self) {
        let opened = self.state_tx.send_if_modified(|state| {
            if *state == ClientState::Open {
                *state = ClientState::Closing;
                true
            } else {
                false
            }
        });
        if !opened {
            return;
        }
        metrics::set_client_state(ClientState::Closing.as_str());
        info!("Closing client");

        tokio::join!(self.network.close(), self.mirror_network.close());

        let _ = self.state_tx.send(ClientState::Closed);
        metrics::set_client_state(ClientState::Closed.as_str());
        info!("Client closed");
    }
}

fn parse_address<K: NodeKind>(address: &str, tls: bool) -> Result<NodeAddress> {
    let parsed: NodeAddress = address.parse()?;
    Ok(if tls {
        parsed.swap_port(K::PLAIN_PORT, K::TLS_PORT)
    } else {
        parsed
    })
}

fn consensus_nodes(network: &BTreeMap<String, String>, tls: bool) -> Result<BTreeMap<AccountId, NodeAddress>> {
    network
        .iter()
        .map(|(id, address)| -> Result<(AccountId, NodeAddress)> {
            Ok((AccountId::new(id.as_str()), parse_address::<Consensus>(address, tls)?))
        })
        .collect()
}

fn mirror_nodes(addresses: &[String], tls: bool) -> Result<BTreeMap<String, NodeAddress>> {
    addresses
        .iter()
        .map(|address| -> Result<(String, NodeAddress)> {
            Ok((address.clone(), parse_address::<Mirror>(address, tls)?))
        })
        .collect()
}
