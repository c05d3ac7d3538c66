// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transactions: fan-out, chunking and signing.
//!
//! A [`Transaction`] is built mutably, then frozen. Freezing fixes the
//! payer, the transaction id and the target nodes, splits the payload into
//! chunks, and pre-builds one signed candidate per (chunk, node):
//!
//! ```text
//!                node 0.0.3     node 0.0.4     node 0.0.5
//!              ┌─────────────┬─────────────┬─────────────┐
//!  chunk 1/2   │ body+sigs   │ body+sigs   │ body+sigs   │  id = T
//!              ├─────────────┼─────────────┼─────────────┤
//!  chunk 2/2   │ body+sigs   │ body+sigs   │ body+sigs   │  id = T + 1ns
//!              └─────────────┴─────────────┴─────────────┘
//! ```
//!
//! Each body names its node, so each node gets its own signed bytes. The
//! execution engine then only picks which pre-built candidate to send.
//! Candidates are immutable and shared behind an `Arc`.
//!
//! Once frozen every setter fails with [`ClientError::Frozen`].

pub mod chunk;

pub use chunk::ChunkSettings;

use crate::client::Client;
use crate::config::ChunkingConfig;
use crate::error::{ClientError, Result};
use crate::execute::{Execute, ExecuteOptions};
use crate::ids::{AccountId, TransactionId};
use crate::metrics;
use crate::receipt;
use crate::status::Status;
use crate::wire::{self, ChunkInfo, PrecheckResponse, Receipt, SchedulableBody, SignaturePair, SignedTransaction, TransactionBody};
use sha2::{Digest, Sha384};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default validity window of a transaction.
pub const DEFAULT_VALID_DURATION: Duration = Duration::from_secs(120);

/// Default fee ceiling, in the ledger's smallest unit.
pub const DEFAULT_MAX_TRANSACTION_FEE: u64 = 200_000_000;

/// Operation kind of a schedule wrapper.
pub const SCHEDULE_CREATE: &str = "scheduleCreate";

/// Produces signatures over body bytes.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> Vec<u8>;

    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// The operation-specific part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: String,
    pub data: Vec<u8>,
    /// Whether the operation may be wrapped by [`Transaction::schedule`].
    pub schedulable: bool,
}

impl Operation {
    pub fn new(kind: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            data: data.into(),
            schedulable: true,
        }
    }

    pub fn not_schedulable(mut self) -> Self {
        self.schedulable = false;
        self
    }
}

/// One signed, serialized transaction for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub node_id: AccountId,
    pub bytes: Vec<u8>,
    /// SHA-384 of `bytes`.
    pub hash: Vec<u8>,
}

/// The candidates of one chunk.
#[derive(Debug, Clone)]
pub struct FrozenChunk {
    pub transaction_id: TransactionId,
    pub info: Option<ChunkInfo>,
    pub candidates: Vec<Candidate>,
}

impl FrozenChunk {
    pub fn candidate(&self, node_id: &AccountId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| &c.node_id == node_id)
    }
}

#[derive(Debug)]
struct Frozen {
    node_ids: Vec<AccountId>,
    chunks: Vec<FrozenChunk>,
    chunked: bool,
    wait_for_receipt: bool,
}

/// What a node said about one submitted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub node_id: AccountId,
    pub transaction_id: TransactionId,
    pub transaction_hash: Vec<u8>,
    pub chunk: Option<ChunkInfo>,
}

impl TransactionResponse {
    /// Poll the receipt from the node that accepted the transaction.
    ///
    /// Fails with [`ClientError::ReceiptStatus`] unless the outcome is `SUCCESS`.
    pub async fn get_receipt(&self, client: &Client) -> Result<Receipt> {
        receipt::get_receipt(client, &self.transaction_id, Some(&self.node_id)).await
    }
}

/// A transaction under construction or frozen for submission.
pub struct Transaction {
    operation: Operation,
    chunking: Option<ChunkSettings>,
    memo: String,
    max_transaction_fee: u64,
    valid_duration: Duration,
    node_ids: Option<Vec<AccountId>>,
    transaction_id: Option<TransactionId>,
    signers: Vec<Arc<dyn Signer>>,
    frozen: Option<Arc<Frozen>>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("kind", &self.operation.kind)
            .field("data_len", &self.operation.data.len())
            .field("chunking", &self.chunking)
            .field("transaction_id", &self.transaction_id)
            .field("node_ids", &self.node_ids)
            .field("signers", &self.signers.len())
            .field("frozen", &self.frozen.is_some())
            .finish()
    }
}

impl Transaction {
    /// A single-body transaction.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            chunking: None,
            memo: String::new(),
            max_transaction_fee: DEFAULT_MAX_TRANSACTION_FEE,
            valid_duration: DEFAULT_VALID_DURATION,
            node_ids: None,
            transaction_id: None,
            signers: Vec::new(),
            frozen: None,
        }
    }

    /// A transaction whose payload is split into chunks.
    pub fn chunked(operation: Operation, settings: ChunkSettings) -> Self {
        let mut tx = Self::new(operation);
        tx.chunking = Some(settings);
        tx
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn max_transaction_fee(&self) -> u64 {
        self.max_transaction_fee
    }

    pub fn valid_duration(&self) -> Duration {
        self.valid_duration
    }

    pub fn is_chunked(&self) -> bool {
        self.chunking.is_some()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// The transaction id of chunk 1, once known.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match &self.frozen {
            Some(frozen) => frozen.chunks.first().map(|c| &c.transaction_id),
            None => self.transaction_id.as_ref(),
        }
    }

    /// Target nodes, once known.
    pub fn node_ids(&self) -> Option<&[AccountId]> {
        match &self.frozen {
            Some(frozen) => Some(&frozen.node_ids),
            None => self.node_ids.as_deref(),
        }
    }

    // =========================================================================
    // Setters (fail once frozen)
    // =========================================================================

    fn require_not_frozen(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(ClientError::Frozen);
        }
        Ok(())
    }

    fn chunking_mut(&mut self) -> Result<&mut ChunkSettings> {
        self.require_not_frozen()?;
        self.chunking
            .as_mut()
            .ok_or_else(|| ClientError::Config("not a chunked transaction".into()))
    }

    pub fn set_memo(&mut self, memo: impl Into<String>) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.memo = memo.into();
        Ok(self)
    }

    pub fn set_max_transaction_fee(&mut self, fee: u64) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.max_transaction_fee = fee;
        Ok(self)
    }

    pub fn set_valid_duration(&mut self, duration: Duration) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.valid_duration = duration;
        Ok(self)
    }

    /// Pin the transaction to explicit nodes instead of letting the pool choose.
    pub fn set_node_ids(&mut self, node_ids: Vec<AccountId>) -> Result<&mut Self> {
        self.require_not_frozen()?;
        if node_ids.is_empty() {
            return Err(ClientError::Config("node id list must not be empty".into()));
        }
        self.node_ids = Some(node_ids);
        Ok(self)
    }

    /// Use an explicit transaction id; its account becomes the payer.
    pub fn set_transaction_id(&mut self, transaction_id: TransactionId) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.transaction_id = Some(transaction_id);
        Ok(self)
    }

    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.operation.data = data.into();
        Ok(self)
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) -> Result<&mut Self> {
        self.chunking_mut()?.chunk_size = Some(chunk_size);
        Ok(self)
    }

    pub fn set_max_chunks(&mut self, max_chunks: usize) -> Result<&mut Self> {
        self.chunking_mut()?.max_chunks = Some(max_chunks);
        Ok(self)
    }

    pub fn set_wait_for_receipt(&mut self, wait: bool) -> Result<&mut Self> {
        self.chunking_mut()?.wait_for_receipt = wait;
        Ok(self)
    }

    /// Add a signer. Signatures are produced when the transaction is frozen.
    pub fn add_signer(&mut self, signer: Arc<dyn Signer>) -> Result<&mut Self> {
        self.require_not_frozen()?;
        self.signers.push(signer);
        Ok(self)
    }

    // =========================================================================
    // Freezing
    // =========================================================================

    /// Freeze against `client`: resolve payer, id and nodes, then build and
    /// sign every candidate. Freezing a frozen transaction does nothing.
    pub async fn freeze_with(&mut self, client: &Client) -> Result<&mut Self> {
        if self.is_frozen() {
            return Ok(self);
        }

        let transaction_id = match &self.transaction_id {
            Some(id) => id.clone(),
            None => {
                let payer = client.operator_account_id().cloned().ok_or_else(|| {
                    ClientError::Config("no payer: set a transaction id or a client operator".into())
                })?;
                TransactionId::generate(payer)
            }
        };

        let node_ids = match &self.node_ids {
            Some(ids) => ids.clone(),
            None => client.network().select_nodes_for_execute().await?,
        };

        let mut signers = self.signers.clone();
        if let Some(operator) = client.operator_signer() {
            let key = operator.public_key();
            if !signers.iter().any(|s| s.public_key() == key) {
                signers.push(operator.clone());
            }
        }

        let frozen = self.build(transaction_id, node_ids, &signers, client.config().chunking.clone())?;
        self.frozen = Some(Arc::new(frozen));
        Ok(self)
    }

    fn build(
        &self,
        initial_id: TransactionId,
        node_ids: Vec<AccountId>,
        signers: &[Arc<dyn Signer>],
        defaults: ChunkingConfig,
    ) -> Result<Frozen> {
        let data = &self.operation.data;
        let (pieces, wait_for_receipt): (Vec<&[u8]>, bool) = match &self.chunking {
            Some(settings) => {
                let (chunk_size, max_chunks) = settings.resolve(&defaults);
                (chunk::split(data, chunk_size, max_chunks)?, settings.wait_for_receipt)
            }
            None => (vec![data.as_slice()], false),
        };
        let total = pieces.len();

        let mut chunks = Vec::with_capacity(total);
        for (index, piece) in pieces.into_iter().enumerate() {
            let transaction_id = chunk::chunk_transaction_id(&initial_id, index);
            let info = self
                .chunking
                .is_some()
                .then(|| chunk::chunk_info(&initial_id, index, total));

            let candidates = node_ids
                .iter()
                .map(|node_id| {
                    let body = TransactionBody {
                        transaction_id: transaction_id.clone(),
                        node_account_id: node_id.clone(),
                        transaction_fee: self.max_transaction_fee,
                        transaction_valid_duration_secs: self.valid_duration.as_secs(),
                        memo: self.memo.clone(),
                        kind: self.operation.kind.clone(),
                        data: piece.to_vec(),
                        chunk_info: info.clone(),
                    };
                    sign_body(&body, signers)
                })
                .collect::<Result<Vec<_>>>()?;

            chunks.push(FrozenChunk {
                transaction_id,
                info,
                candidates,
            });
        }

        if self.chunking.is_some() {
            metrics::record_chunked_transaction(total, data.len());
        }
        debug!(
            kind = %self.operation.kind,
            transaction_id = %initial_id,
            nodes = node_ids.len(),
            chunks = total,
            signers = signers.len(),
            "Froze transaction"
        );

        Ok(Frozen {
            node_ids,
            chunks,
            chunked: self.chunking.is_some(),
            wait_for_receipt,
        })
    }

    fn frozen(&self) -> Result<&Arc<Frozen>> {
        self.frozen
            .as_ref()
            .ok_or_else(|| ClientError::invalid_state("frozen transaction", "unfrozen transaction"))
    }

    /// Number of chunks, once frozen.
    pub fn chunk_count(&self) -> Option<usize> {
        self.frozen.as_ref().map(|f| f.chunks.len())
    }

    /// Frozen candidates of chunk `index` (0-based).
    pub fn chunk(&self, index: usize) -> Result<&FrozenChunk> {
        let frozen = self.frozen()?;
        frozen.chunks.get(index).ok_or_else(|| {
            ClientError::invalid_state(format!("chunk index below {}", frozen.chunks.len()), index)
        })
    }

    /// SHA-384 of the candidate for `node_id` in chunk `index`.
    pub fn transaction_hash(&self, index: usize, node_id: &AccountId) -> Result<Vec<u8>> {
        self.chunk(index)?
            .candidate(node_id)
            .map(|c| c.hash.clone())
            .ok_or_else(|| ClientError::NodeNotFound(node_id.to_string()))
    }

    /// Hash of chunk 1 per node.
    pub fn transaction_hashes(&self) -> Result<BTreeMap<AccountId, Vec<u8>>> {
        Ok(self
            .chunk(0)?
            .candidates
            .iter()
            .map(|c| (c.node_id.clone(), c.hash.clone()))
            .collect())
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Submit and return the first chunk's response.
    pub async fn execute(&mut self, client: &Client) -> Result<TransactionResponse> {
        let options = *client.executor().options();
        self.execute_with(client, &options).await
    }

    pub async fn execute_with(&mut self, client: &Client, options: &ExecuteOptions) -> Result<TransactionResponse> {
        self.execute_all_with(client, options)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Internal("transaction produced no chunks".into()))
    }

    /// Submit every chunk in order and return all responses.
    pub async fn execute_all(&mut self, client: &Client) -> Result<Vec<TransactionResponse>> {
        let options = *client.executor().options();
        self.execute_all_with(client, &options).await
    }

    /// Submit every chunk in order with per-request ceilings.
    ///
    /// Chunk `i + 1` is sent only after chunk `i` succeeded (and, when
    /// waiting for receipts, after its receipt). On failure no partial
    /// result is returned.
    pub async fn execute_all_with(
        &mut self,
        client: &Client,
        options: &ExecuteOptions,
    ) -> Result<Vec<TransactionResponse>> {
        self.freeze_with(client).await?;
        let frozen = self.frozen()?.clone();
        let total = frozen.chunks.len();
        let mut responses = Vec::with_capacity(total);

        for (index, chunk) in frozen.chunks.iter().enumerate() {
            match execute_chunk(client, &frozen, chunk, options).await {
                Ok(response) => {
                    if frozen.chunked {
                        metrics::record_chunk("success");
                    }
                    responses.push(response);
                }
                Err(e) if frozen.chunked => {
                    metrics::record_chunk("failed");
                    warn!(
                        transaction_id = %chunk.transaction_id,
                        index,
                        total,
                        error = %e,
                        "Chunk failed"
                    );
                    return Err(ClientError::ChunkFailed {
                        index,
                        total,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            kind = %self.operation.kind,
            transaction_id = ?self.transaction_id(),
            chunks = total,
            "Transaction submitted"
        );
        Ok(responses)
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Wrap this transaction's body into a `scheduleCreate` transaction.
    ///
    /// A chunked payload must fit in one chunk of `client`'s configured size
    /// unless the transaction sets its own.
    pub fn schedule(&self, client: &Client) -> Result<Transaction> {
        self.schedule_with(&client.config().chunking)
    }

    /// [`schedule`](Self::schedule) against explicit chunking defaults.
    pub fn schedule_with(&self, defaults: &ChunkingConfig) -> Result<Transaction> {
        self.require_not_frozen()?;
        if !self.operation.schedulable {
            return Err(ClientError::ScheduleForbidden(format!(
                "{} cannot be scheduled",
                self.operation.kind
            )));
        }
        if self.node_ids.is_some() {
            return Err(ClientError::ScheduleForbidden(
                "underlying transaction has explicit node ids".into(),
            ));
        }
        if let Some(settings) = &self.chunking {
            let (chunk_size, _) = settings.resolve(defaults);
            if self.operation.data.len() > chunk_size {
                return Err(ClientError::ScheduleForbidden(format!(
                    "chunked payload of {} bytes exceeds one chunk of {} bytes",
                    self.operation.data.len(),
                    chunk_size
                )));
            }
        }

        let body = SchedulableBody {
            kind: self.operation.kind.clone(),
            data: self.operation.data.clone(),
            memo: self.memo.clone(),
            transaction_fee: self.max_transaction_fee,
        };
        let mut scheduled = Transaction::new(Operation::new(SCHEDULE_CREATE, wire::encode(&body)?).not_schedulable());
        scheduled.transaction_id = self.transaction_id.clone();
        Ok(scheduled)
    }
}

fn sign_body(body: &TransactionBody, signers: &[Arc<dyn Signer>]) -> Result<Candidate> {
    let body_bytes = wire::encode(body)?;
    let signatures = signers
        .iter()
        .map(|signer| SignaturePair {
            public_key: signer.public_key(),
            signature: signer.sign(&body_bytes),
        })
        .collect();
    let bytes = wire::encode(&SignedTransaction { body_bytes, signatures })?;
    let hash = Sha384::digest(&bytes).to_vec();
    Ok(Candidate {
        node_id: body.node_account_id.clone(),
        bytes,
        hash,
    })
}

async fn execute_chunk(
    client: &Client,
    frozen: &Frozen,
    chunk: &FrozenChunk,
    options: &ExecuteOptions,
) -> Result<TransactionResponse> {
    let request = ChunkSubmission {
        chunk,
        node_ids: &frozen.node_ids,
    };
    let response = client.execute_with(&request, options).await?;
    if frozen.wait_for_receipt {
        response.get_receipt(client).await?;
    }
    Ok(response)
}

/// Submission of one chunk to its bound nodes.
struct ChunkSubmission<'a> {
    chunk: &'a FrozenChunk,
    node_ids: &'a [AccountId],
}

impl Execute for ChunkSubmission<'_> {
    type Response = PrecheckResponse;
    type Output = TransactionResponse;

    fn method(&self) -> &'static str {
        wire::METHOD_SUBMIT_TRANSACTION
    }

    fn node_ids(&self) -> Option<&[AccountId]> {
        Some(self.node_ids)
    }

    fn transaction_id(&self) -> Option<&TransactionId> {
        Some(&self.chunk.transaction_id)
    }

    fn make_request(&self, node_id: &AccountId) -> Result<Vec<u8>> {
        self.chunk
            .candidate(node_id)
            .map(|c| c.bytes.clone())
            .ok_or_else(|| ClientError::NodeNotFound(node_id.to_string()))
    }

    fn read_response(&self, bytes: &[u8]) -> Result<PrecheckResponse> {
        wire::decode(bytes)
    }

    fn response_status(&self, response: &PrecheckResponse) -> Status {
        response.status
    }

    fn map_response(&self, _response: PrecheckResponse, node_id: &AccountId) -> Result<TransactionResponse> {
        let candidate = self
            .chunk
            .candidate(node_id)
            .ok_or_else(|| ClientError::NodeNotFound(node_id.to_string()))?;
        Ok(TransactionResponse {
            node_id: node_id.clone(),
            transaction_id: self.chunk.transaction_id.clone(),
            transaction_hash: candidate.hash.clone(),
            chunk: self.chunk.info.clone(),
        })
    }
}
