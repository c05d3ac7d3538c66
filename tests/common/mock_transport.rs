//! Mock transport for testing.
//!
//! `MockChannel` answers from a per-channel script and records every call.
//! `RecordingBackoff` records which attempts asked for a delay and returns a
//! 1ms wait so tests stay fast.

use ledger_client_engine::backoff::BackoffPolicy;
use ledger_client_engine::transport::{BoxFuture, Channel, InProcessConnector, TransportCode, TransportError};
use ledger_client_engine::wire::{
    self, PrecheckResponse, Receipt, ReceiptResponse, SignedTransaction, TransactionBody, METHOD_GET_RECEIPT,
    METHOD_SUBMIT_TRANSACTION,
};
use ledger_client_engine::{AccountId, Client, ClientConfig, Signer, Status};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer a submission with this precheck status.
    Precheck(Status),
    /// Answer a receipt query.
    Receipt { header: Status, receipt: Option<Status> },
    /// Fail the call at the transport level.
    Fail(TransportCode, &'static str),
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn unavailable() -> Self {
        Reply::Fail(TransportCode::Unavailable, "connection refused")
    }

    pub fn receipt(status: Status) -> Self {
        Reply::Receipt {
            header: Status::Ok,
            receipt: Some(status),
        }
    }
}

/// A recorded unary call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub request: Vec<u8>,
}

impl RecordedCall {
    pub fn is_submit(&self) -> bool {
        self.method == METHOD_SUBMIT_TRANSACTION
    }

    /// Decode the signed transaction of a submission.
    pub fn signed(&self) -> SignedTransaction {
        wire::decode(&self.request).unwrap()
    }

    /// Decode the body of a submission.
    pub fn body(&self) -> TransactionBody {
        wire::decode(&self.signed().body_bytes).unwrap()
    }
}

/// Scripted channel that records all calls.
///
/// # Example
/// ```rust,ignore
/// let channel = MockChannel::new();
/// channel.push(Reply::Precheck(Status::Busy));
/// // first call answers BUSY, later calls fall back to OK
/// ```
pub struct MockChannel {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
    closes: AtomicUsize,
    hang_on_close: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            hang_on_close: AtomicBool::new(false),
        })
    }

    /// Queue a reply for the next unanswered call.
    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn push_n(&self, n: usize, reply: Reply) {
        for _ in 0..n {
            self.push(reply.clone());
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Methods called, in order.
    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn submissions(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.is_submit()).collect()
    }

    /// Make `close()` never complete.
    pub fn hang_on_close(&self) {
        self.hang_on_close.store(true, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn next_reply(&self, method: &str) -> Reply {
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        match method {
            METHOD_GET_RECEIPT => Reply::receipt(Status::Success),
            _ => Reply::Precheck(Status::Ok),
        }
    }
}

impl Channel for MockChannel {
    fn unary<'a>(&'a self, method: &'a str, request: Vec<u8>) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_string(),
            request,
        });
        let reply = self.next_reply(method);

        Box::pin(async move {
            match reply {
                Reply::Precheck(status) => Ok(wire::encode(&PrecheckResponse { status }).unwrap()),
                Reply::Receipt { header, receipt } => Ok(wire::encode(&ReceiptResponse {
                    status: header,
                    receipt: receipt.map(|status| Receipt { status }),
                })
                .unwrap()),
                Reply::Fail(code, message) => Err(TransportError::new(code, message)),
                Reply::Hang => std::future::pending().await,
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let hang = self.hang_on_close.load(Ordering::SeqCst);
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}

/// Backoff that records the attempts it was asked about.
pub struct RecordingBackoff {
    attempts: Mutex<Vec<u32>>,
}

impl RecordingBackoff {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Attempt numbers that were followed by a backoff, in order.
    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

impl BackoffPolicy for RecordingBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.attempts.lock().unwrap().push(attempt);
        Duration::from_millis(1)
    }
}

/// Deterministic signer: the signature is SHA-256 over a key byte and the message.
pub struct TestSigner(pub u8);

impl Signer for TestSigner {
    fn public_key(&self) -> Vec<u8> {
        vec![self.0; 8]
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update([self.0]);
        hasher.update(message);
        hasher.finalize().to_vec()
    }
}

pub fn node_id(n: u32) -> AccountId {
    AccountId::new(format!("0.0.{}", n))
}

/// A set of in-process consensus nodes, each backed by a `MockChannel`.
pub struct TestNet {
    pub connector: Arc<InProcessConnector>,
    pub channels: BTreeMap<AccountId, Arc<MockChannel>>,
    pub config: ClientConfig,
}

impl TestNet {
    /// Nodes `0.0.<n>` reachable at `in-process:node-<n>`.
    pub fn new(ids: &[u32]) -> Self {
        let connector = Arc::new(InProcessConnector::new());
        let mut channels = BTreeMap::new();
        let mut addresses = Vec::new();

        for n in ids {
            let channel = MockChannel::new();
            connector.register(format!("node-{}", n), channel.clone());
            channels.insert(node_id(*n), channel);
            addresses.push((format!("0.0.{}", n), format!("in-process:node-{}", n)));
        }

        let pairs: Vec<(&str, &str)> = addresses.iter().map(|(id, addr)| (id.as_str(), addr.as_str())).collect();
        let config = ClientConfig::for_testing(&pairs);

        Self {
            connector,
            channels,
            config,
        }
    }

    pub fn channel(&self, n: u32) -> &Arc<MockChannel> {
        &self.channels[&node_id(n)]
    }

    pub async fn client(&self, backoff: Arc<RecordingBackoff>) -> Client {
        Client::with_backoff(self.config.clone(), self.connector.clone(), backoff)
            .await
            .unwrap()
    }

    /// Total calls across all nodes.
    pub fn total_calls(&self) -> usize {
        self.channels.values().map(|c| c.call_count()).sum()
    }
}
