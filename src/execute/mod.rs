// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The execution engine.
//!
//! Drives one logical request across attempts, nodes and backoff delays
//! until it succeeds, fails terminally or runs out of attempts or time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          Executor::execute()                         │
//! │                                                                      │
//! │   ┌────────────┐   ┌──────────────┐   ┌───────────┐   ┌───────────┐  │
//! │   │ pick node  │──►│ make_request │──►│  unary()  │──►│ classify  │  │
//! │   │ bound/pool │   │  (prebuilt)  │   │ +deadline │   │  outcome  │  │
//! │   └────────────┘   └──────────────┘   └───────────┘   └─────┬─────┘  │
//! │         ▲                                                   │        │
//! │         │        on_failure() (transport only)              │        │
//! │         └────────────── sleep(backoff.delay(n)) ◄───────────┘        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Anything executable implements [`Execute`]: it says which nodes it is
//! bound to (if any), hands over the request bytes for a node, and maps the
//! node's answer. The engine owns everything else.
//!
//! # Node choice
//!
//! - **Bound** requests (transactions, whose bodies name their node) walk
//!   the bound list round-robin starting at the attempt index and take the
//!   first healthy node. If every bound node is unhealthy the one that
//!   recovers soonest is used anyway; the engine does not wait for it.
//! - **Unbound** requests ask the pool for its healthiest node on every
//!   attempt, so a node penalized by the previous attempt is skipped.
//!
//! # Ceilings
//!
//! Every request is bounded by `max_attempts` and by an overall
//! `request_timeout`; each transport call is bounded by `grpc_deadline`.
//! The only suspension points are the transport call and the backoff sleep.

mod types;

pub use types::{classify, AttemptOutcome, AttemptState, ExecutionState};

use crate::backoff::BackoffPolicy;
use crate::config::ExecutionConfig;
use crate::error::{ClientError, ErrorKind, Result};
use crate::ids::{AccountId, TransactionId};
use crate::metrics;
use crate::network::Network;
use crate::node::{Consensus, Node};
use crate::status::Status;
use crate::transport::{TransportCode, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace, warn};

/// A request the engine can drive to completion.
pub trait Execute: Send + Sync {
    /// Decoded node response.
    type Response: Send;
    /// What the caller gets back on success.
    type Output: Send;

    /// Transport method name.
    fn method(&self) -> &'static str;

    /// Nodes this request is bound to, or `None` to let the pool choose.
    fn node_ids(&self) -> Option<&[AccountId]> {
        None
    }

    fn transaction_id(&self) -> Option<&TransactionId> {
        None
    }

    /// Request bytes for `node_id`.
    fn make_request(&self, node_id: &AccountId) -> Result<Vec<u8>>;

    fn read_response(&self, bytes: &[u8]) -> Result<Self::Response>;

    fn response_status(&self, response: &Self::Response) -> Status;

    fn should_retry(&self, status: Status, _response: &Self::Response) -> ExecutionState {
        ExecutionState::from_precheck(status)
    }

    fn should_retry_transport(&self, error: &TransportError) -> bool {
        error.is_transient()
    }

    fn map_response(&self, response: Self::Response, node_id: &AccountId) -> Result<Self::Output>;

    fn map_status_error(&self, status: Status, _response: &Self::Response) -> ClientError {
        ClientError::Precheck {
            status,
            transaction_id: self.transaction_id().cloned(),
        }
    }

    /// Render request bytes for trace logs.
    fn debug_to_string(&self, request: &[u8]) -> String {
        hex::encode(request)
    }
}

/// Per-request ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub max_attempts: u32,
    /// Overall deadline across all attempts and backoff sleeps.
    pub request_timeout: Duration,
    /// Deadline for one transport call.
    pub grpc_deadline: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl ExecuteOptions {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            request_timeout: config.request_timeout_duration(),
            grpc_deadline: config.grpc_deadline_duration(),
        }
    }
}

/// Failure of one attempt, tagged with how the loop should treat it.
type AttemptError = (ErrorKind, ClientError);

/// Runs [`Execute`] requests against a consensus pool.
#[derive(Clone)]
pub struct Executor {
    network: Arc<Network<Consensus>>,
    backoff: Arc<dyn BackoffPolicy>,
    options: ExecuteOptions,
}

impl Executor {
    pub fn new(network: Arc<Network<Consensus>>, backoff: Arc<dyn BackoffPolicy>, options: ExecuteOptions) -> Self {
        Self {
            network,
            backoff,
            options,
        }
    }

    pub fn network(&self) -> &Arc<Network<Consensus>> {
        &self.network
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Execute with the default ceilings.
    pub async fn execute<E: Execute>(&self, request: &E) -> Result<E::Output> {
        self.execute_with(request, &self.options).await
    }

    /// Execute with per-request ceilings.
    pub async fn execute_with<E: Execute>(&self, request: &E, options: &ExecuteOptions) -> Result<E::Output> {
        let method = request.method();
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = None;

        let outcome = timeout(
            options.request_timeout,
            self.run(request, options, &mut attempts, &mut last_error),
        )
        .await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Request deadline exceeded"
                );
                Err(ClientError::Timeout {
                    elapsed,
                    last: last_error.map(Box::new),
                })
            }
        };

        let label = match &result {
            Ok(_) => "success",
            Err(ClientError::Timeout { .. }) => "timeout",
            Err(ClientError::MaxAttemptsExceeded { .. }) => "exhausted",
            Err(_) => "failed",
        };
        metrics::record_execution(method, label, attempts, elapsed);
        result
    }

    async fn run<E: Execute>(
        &self,
        request: &E,
        options: &ExecuteOptions,
        attempts: &mut u32,
        last_error: &mut Option<ClientError>,
    ) -> Result<E::Output> {
        let method = request.method();
        let mut attempt = 1;

        loop {
            *attempts = attempt;
            let state = AttemptState::Attempting(attempt);

            let node = self.node_for_attempt(request, attempt).await?;
            node.mark_used();
            let node_id = node.key().clone();

            let result = self.attempt(request, &node, options).await;
            let outcome = classify(attempt, options.max_attempts, result.as_ref().err().map(|(kind, _)| *kind));
            debug!(
                method,
                node = %node_id,
                attempt,
                from = %state,
                to = %outcome.next_state(),
                "Attempt finished"
            );

            match (outcome, result) {
                (AttemptOutcome::Succeed, Ok(response)) => {
                    node.on_success();
                    metrics::record_attempt(method, node_id.as_str(), "success");
                    return request.map_response(response, &node_id);
                }
                (AttemptOutcome::Retry { next_attempt, penalize }, Err((_, error))) => {
                    if penalize {
                        node.on_failure();
                    }
                    let label = if penalize { "transport_retry" } else { "status_retry" };
                    metrics::record_attempt(method, node_id.as_str(), label);

                    let delay = self.backoff.delay(attempt);
                    metrics::record_backoff(method, delay);
                    warn!(
                        method,
                        node = %node_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying request"
                    );
                    *last_error = Some(error);
                    sleep(delay).await;
                    attempt = next_attempt;
                }
                (AttemptOutcome::Exhausted { penalize }, Err((_, error))) => {
                    if penalize {
                        node.on_failure();
                    }
                    metrics::record_attempt(method, node_id.as_str(), "failed");
                    warn!(method, node = %node_id, attempts = attempt, error = %error, "Giving up after max attempts");
                    return Err(ClientError::MaxAttemptsExceeded {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
                (AttemptOutcome::Fail, Err((_, error))) => {
                    metrics::record_attempt(method, node_id.as_str(), "failed");
                    debug!(method, node = %node_id, attempt, error = %error, "Request failed");
                    return Err(error);
                }
                (outcome, _) => {
                    return Err(ClientError::Internal(format!(
                        "attempt outcome {:?} does not match its result",
                        outcome
                    )));
                }
            }
        }
    }

    /// Choose the node for attempt `attempt` (1-based).
    async fn node_for_attempt<E: Execute>(&self, request: &E, attempt: u32) -> Result<Arc<Node<Consensus>>> {
        let Some(bound) = request.node_ids() else {
            return self.network.healthiest().await;
        };
        if bound.is_empty() {
            return Err(ClientError::NoNodes("bound"));
        }
        if self.network.is_closed() {
            return Err(ClientError::Shutdown);
        }

        let start = (attempt.saturating_sub(1) as usize) % bound.len();
        let mut soonest: Option<Arc<Node<Consensus>>> = None;

        for offset in 0..bound.len() {
            let id = &bound[(start + offset) % bound.len()];
            let Some(node) = self.network.node(id).await else {
                continue;
            };
            if node.is_healthy() {
                return Ok(node);
            }
            let sooner = soonest
                .as_ref()
                .map_or(true, |best| node.remaining_backoff() < best.remaining_backoff());
            if sooner {
                soonest = Some(node);
            }
        }

        soonest.ok_or_else(|| {
            let ids: Vec<String> = bound.iter().map(|id| id.to_string()).collect();
            ClientError::NodeNotFound(ids.join(", "))
        })
    }

    /// Run a single attempt against `node`.
    async fn attempt<E: Execute>(
        &self,
        request: &E,
        node: &Node<Consensus>,
        options: &ExecuteOptions,
    ) -> std::result::Result<E::Response, AttemptError> {
        let method = request.method();
        let node_id = node.key();

        let channel = node
            .channel()
            .await
            .map_err(|e| transport_failure(request, node_id, e))?;
        let bytes = request.make_request(node_id).map_err(tagged)?;
        trace!(method, node = %node_id, request = %request.debug_to_string(&bytes), "Sending request");

        let response_bytes = match timeout(options.grpc_deadline, channel.unary(method, bytes)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(transport_failure(request, node_id, e)),
            Err(_) => {
                let e = TransportError::new(
                    TransportCode::DeadlineExceeded,
                    format!("no response within {:?}", options.grpc_deadline),
                );
                return Err(transport_failure(request, node_id, e));
            }
        };
        trace!(method, node = %node_id, response = %hex::encode(&response_bytes), "Received response");

        let response = request.read_response(&response_bytes).map_err(tagged)?;
        let status = request.response_status(&response);

        match request.should_retry(status, &response) {
            ExecutionState::Success => Ok(response),
            ExecutionState::Retry => Err((
                ErrorKind::TransientApplication,
                ClientError::Status {
                    node: node_id.to_string(),
                    status,
                },
            )),
            ExecutionState::RequestError => Err((
                ErrorKind::TerminalApplication,
                request.map_status_error(status, &response),
            )),
        }
    }
}

fn tagged(error: ClientError) -> AttemptError {
    (error.kind(), error)
}

fn transport_failure<E: Execute>(request: &E, node_id: &AccountId, error: TransportError) -> AttemptError {
    metrics::record_transport_error(node_id.as_str(), &error.code.to_string());
    let kind = if request.should_retry_transport(&error) {
        ErrorKind::TransientTransport
    } else {
        ErrorKind::TerminalTransport
    };
    (kind, ClientError::transport(node_id, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkSettings;
    use crate::node::NodeAddress;
    use crate::transport::{BoxFuture, Channel, InProcessConnector};
    use crate::wire::{self, PrecheckResponse};
    use std::collections::BTreeMap;

    struct FixedBackoff(Duration);

    impl BackoffPolicy for FixedBackoff {
        fn delay(&self, _attempt: u32) -> Duration {
            self.0
        }
    }

    enum Reply {
        Status(Status),
        Hang,
    }

    struct StubChannel(Reply);

    impl Channel for StubChannel {
        fn unary<'a>(&'a self, _method: &'a str, _request: Vec<u8>) -> BoxFuture<'a, std::result::Result<Vec<u8>, TransportError>> {
            Box::pin(async move {
                match &self.0 {
                    Reply::Status(status) => Ok(wire::encode(&PrecheckResponse { status: *status }).unwrap()),
                    Reply::Hang => std::future::pending().await,
                }
            })
        }

        fn close(&self) -> BoxFuture<'_, std::result::Result<(), TransportError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct Ping {
        nodes: Option<Vec<AccountId>>,
    }

    impl Execute for Ping {
        type Response = PrecheckResponse;
        type Output = AccountId;

        fn method(&self) -> &'static str {
            "ping"
        }

        fn node_ids(&self) -> Option<&[AccountId]> {
            self.nodes.as_deref()
        }

        fn make_request(&self, node_id: &AccountId) -> Result<Vec<u8>> {
            Ok(node_id.as_str().as_bytes().to_vec())
        }

        fn read_response(&self, bytes: &[u8]) -> Result<PrecheckResponse> {
            wire::decode(bytes)
        }

        fn response_status(&self, response: &PrecheckResponse) -> Status {
            response.status
        }

        fn map_response(&self, _response: PrecheckResponse, node_id: &AccountId) -> Result<AccountId> {
            Ok(node_id.clone())
        }
    }

    fn id(n: u32) -> AccountId {
        AccountId::new(format!("0.0.{}", n))
    }

    async fn executor(replies: Vec<(u32, Reply)>, options: ExecuteOptions) -> Executor {
        let connector = Arc::new(InProcessConnector::new());
        let mut nodes = BTreeMap::new();
        for (n, reply) in replies {
            let route = format!("node-{}", n);
            connector.register(route.clone(), Arc::new(StubChannel(reply)));
            nodes.insert(id(n), NodeAddress::in_process(route));
        }
        let network = Network::with_nodes(connector, NetworkSettings::default(), nodes)
            .await
            .unwrap();
        Executor::new(
            Arc::new(network),
            Arc::new(FixedBackoff(Duration::from_millis(10))),
            options,
        )
    }

    fn options(max_attempts: u32) -> ExecuteOptions {
        ExecuteOptions {
            max_attempts,
            request_timeout: Duration::from_secs(10),
            grpc_deadline: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_default_options() {
        let options = ExecuteOptions::default();
        assert_eq!(options.max_attempts, 10);
        assert_eq!(options.request_timeout, Duration::from_secs(120));
        assert_eq!(options.grpc_deadline, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_bound_node_rotates_from_attempt_index() {
        let ok = || Reply::Status(Status::Ok);
        let exec = executor(vec![(3, ok()), (4, ok()), (5, ok())], options(3)).await;
        let request = Ping {
            nodes: Some(vec![id(3), id(4), id(5)]),
        };

        assert_eq!(exec.node_for_attempt(&request, 1).await.unwrap().key(), &id(3));
        assert_eq!(exec.node_for_attempt(&request, 2).await.unwrap().key(), &id(4));
        assert_eq!(exec.node_for_attempt(&request, 4).await.unwrap().key(), &id(3));
    }

    #[tokio::test]
    async fn test_bound_node_skips_unhealthy() {
        let ok = || Reply::Status(Status::Ok);
        let exec = executor(vec![(3, ok()), (4, ok()), (5, ok())], options(3)).await;
        exec.network().node(&id(4)).await.unwrap().on_failure();

        let request = Ping {
            nodes: Some(vec![id(3), id(4), id(5)]),
        };
        assert_eq!(exec.node_for_attempt(&request, 2).await.unwrap().key(), &id(5));
    }

    #[tokio::test]
    async fn test_bound_all_unhealthy_picks_soonest_recovery() {
        let ok = || Reply::Status(Status::Ok);
        let exec = executor(vec![(3, ok()), (4, ok())], options(3)).await;
        let slow = exec.network().node(&id(3)).await.unwrap();
        slow.on_failure();
        slow.on_failure();
        exec.network().node(&id(4)).await.unwrap().on_failure();

        let request = Ping {
            nodes: Some(vec![id(3), id(4)]),
        };
        assert_eq!(exec.node_for_attempt(&request, 1).await.unwrap().key(), &id(4));
    }

    #[tokio::test]
    async fn test_bound_unknown_nodes() {
        let exec = executor(vec![(3, Reply::Status(Status::Ok))], options(3)).await;
        let request = Ping {
            nodes: Some(vec![id(8), id(9)]),
        };
        assert!(matches!(exec.execute(&request).await, Err(ClientError::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_unbound_success() {
        let exec = executor(vec![(3, Reply::Status(Status::Ok))], options(3)).await;
        let node = exec.execute(&Ping { nodes: None }).await.unwrap();
        assert_eq!(node, id(3));
        assert_eq!(exec.network().node(&id(3)).await.unwrap().use_count(), 1);
    }

    #[tokio::test]
    async fn test_request_error_is_precheck() {
        let exec = executor(vec![(3, Reply::Status(Status::InvalidSignature))], options(5)).await;
        let err = exec.execute(&Ping { nodes: None }).await.unwrap_err();
        assert!(matches!(err, ClientError::Precheck { status: Status::InvalidSignature, .. }));
        // terminal on the first attempt
        assert_eq!(exec.network().node(&id(3)).await.unwrap().use_count(), 1);
    }

    #[tokio::test]
    async fn test_busy_exhausts_attempts_without_penalty() {
        let exec = executor(vec![(3, Reply::Status(Status::Busy))], options(3)).await;
        let err = exec.execute(&Ping { nodes: None }).await.unwrap_err();

        match err {
            ClientError::MaxAttemptsExceeded { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status(), Some(Status::Busy));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let node = exec.network().node(&id(3)).await.unwrap();
        assert!(node.is_healthy());
        assert_eq!(node.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grpc_deadline_is_terminal() {
        let exec = executor(vec![(3, Reply::Hang)], options(5)).await;
        let err = exec.execute(&Ping { nodes: None }).await.unwrap_err();

        match err {
            ClientError::Transport { source, .. } => assert_eq!(source.code, TransportCode::DeadlineExceeded),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_reports_last_error() {
        let exec = executor(vec![(3, Reply::Status(Status::Busy))], options(1000)).await;
        let short = ExecuteOptions {
            request_timeout: Duration::from_millis(55),
            ..options(1000)
        };
        let err = exec.execute_with(&Ping { nodes: None }, &short).await.unwrap_err();

        match err {
            ClientError::Timeout { elapsed, last } => {
                assert!(elapsed >= Duration::from_millis(55));
                assert_eq!(last.and_then(|e| e.status()), Some(Status::Busy));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_network_is_shutdown() {
        let exec = executor(vec![(3, Reply::Status(Status::Ok))], options(3)).await;
        exec.network().close().await;
        assert!(matches!(exec.execute(&Ping { nodes: None }).await, Err(ClientError::Shutdown)));
        let bound = Ping { nodes: Some(vec![id(3)]) };
        assert!(matches!(exec.execute(&bound).await, Err(ClientError::Shutdown)));
    }
}
