//! Application-level response codes.
//!
//! Every response from a replica carries one of these codes. The engine only
//! interprets a handful of them (see [`crate::execute`]); the rest are
//! surfaced to the caller unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response code reported by a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Precheck passed.
    Ok,
    InvalidTransaction,
    PayerAccountNotFound,
    InvalidNodeAccount,
    /// The transaction's valid-start window has passed.
    TransactionExpired,
    InvalidTransactionStart,
    InvalidTransactionDuration,
    InvalidSignature,
    MemoTooLong,
    InsufficientTxFee,
    InsufficientPayerBalance,
    DuplicateTransaction,
    /// The replica is overloaded; try again later.
    Busy,
    NotSupported,
    InvalidTransactionId,
    /// The receipt is not yet visible on the replica.
    ReceiptNotFound,
    /// The record is not yet visible on the replica.
    RecordNotFound,
    /// Consensus has not been reached yet.
    Unknown,
    /// The transaction reached consensus and was applied.
    Success,
    FailInvalid,
    FailFee,
    /// The replica could not hand the transaction to its platform layer.
    PlatformTransactionNotCreated,
    /// The replica's platform layer is not active yet.
    PlatformNotActive,
    InvalidChunkNumber,
    InvalidChunkTransactionId,
    /// Any code this client does not know about.
    #[serde(other)]
    Unrecognized,
}

impl Status {
    /// Canonical upper-case name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidTransaction => "INVALID_TRANSACTION",
            Self::PayerAccountNotFound => "PAYER_ACCOUNT_NOT_FOUND",
            Self::InvalidNodeAccount => "INVALID_NODE_ACCOUNT",
            Self::TransactionExpired => "TRANSACTION_EXPIRED",
            Self::InvalidTransactionStart => "INVALID_TRANSACTION_START",
            Self::InvalidTransactionDuration => "INVALID_TRANSACTION_DURATION",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::MemoTooLong => "MEMO_TOO_LONG",
            Self::InsufficientTxFee => "INSUFFICIENT_TX_FEE",
            Self::InsufficientPayerBalance => "INSUFFICIENT_PAYER_BALANCE",
            Self::DuplicateTransaction => "DUPLICATE_TRANSACTION",
            Self::Busy => "BUSY",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::InvalidTransactionId => "INVALID_TRANSACTION_ID",
            Self::ReceiptNotFound => "RECEIPT_NOT_FOUND",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::Unknown => "UNKNOWN",
            Self::Success => "SUCCESS",
            Self::FailInvalid => "FAIL_INVALID",
            Self::FailFee => "FAIL_FEE",
            Self::PlatformTransactionNotCreated => "PLATFORM_TRANSACTION_NOT_CREATED",
            Self::PlatformNotActive => "PLATFORM_NOT_ACTIVE",
            Self::InvalidChunkNumber => "INVALID_CHUNK_NUMBER",
            Self::InvalidChunkTransactionId => "INVALID_CHUNK_TRANSACTION_ID",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
