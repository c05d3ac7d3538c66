//! Wire envelopes.
//!
//! The engine treats request and response payloads as opaque bytes except
//! for a few fields (status, node id, chunk metadata). These envelopes give
//! those fields a concrete, self-describing JSON encoding so the engine can
//! run end to end over any [`Channel`](crate::transport::Channel). Binary
//! fields are hex strings.

use crate::error::Result;
use crate::ids::{AccountId, TransactionId};
use crate::status::Status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Method used to submit a signed transaction.
pub const METHOD_SUBMIT_TRANSACTION: &str = "submitTransaction";

/// Method used to poll a transaction receipt.
pub const METHOD_GET_RECEIPT: &str = "getTransactionReceipt";

/// Position of one chunk within a chunked operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Identity of chunk 1; every chunk references it.
    pub initial_transaction_id: TransactionId,
    /// 1-based chunk number.
    pub number: u32,
    pub total: u32,
}

/// The unsigned body of one candidate transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub transaction_id: TransactionId,
    pub node_account_id: AccountId,
    pub transaction_fee: u64,
    pub transaction_valid_duration_secs: u64,
    #[serde(default)]
    pub memo: String,
    pub kind: String,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
}

/// Body of an operation wrapped in a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulableBody {
    pub kind: String,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub memo: String,
    pub transaction_fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePair {
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// A body together with its signatures, as sent to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(with = "hex::serde")]
    pub body_bytes: Vec<u8>,
    pub signatures: Vec<SignaturePair>,
}

/// A node's answer to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckResponse {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRequest {
    pub transaction_id: TransactionId,
}

/// The consensus outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptResponse {
    /// Status of the query itself.
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}
