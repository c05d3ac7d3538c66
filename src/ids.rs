//! Identifiers: accounts, timestamps and transaction identities.
//!
//! A [`TransactionId`] names one logical operation across every candidate
//! copy sent to different replicas, and (with [`TransactionId::plus_nanos`])
//! every chunk of a chunked operation.
//!
//! ```text
//! 0.0.1001@1700000000.000000042?scheduled/3
//! └──┬───┘ └──────────┬────────┘└───┬───┘└┬┘
//!  payer         valid start    scheduled nonce
//! ```

use crate::error::{ClientError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Window by which generated valid-start times are moved into the past, in
/// milliseconds. Covers clock skew between the client and the replicas.
const BACKDATE_MILLIS: std::ops::Range<u64> = 8_000..13_000;

/// Opaque account identifier (`shard.realm.num` in practice).
///
/// Used both as the payer of a transaction and as the identity of a
/// consensus replica.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A point in time with nanosecond precision, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        let carry = (nanos as u64 / NANOS_PER_SECOND) as i64;
        Self {
            seconds: seconds + carry,
            nanos: (nanos as u64 % NANOS_PER_SECOND) as u32,
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds: now.timestamp(),
            nanos: now.timestamp_subsec_nanos(),
        }
    }

    /// This timestamp advanced by `nanos` nanoseconds, carrying into seconds.
    pub fn plus_nanos(&self, nanos: u64) -> Self {
        let total = self.nanos as u64 + nanos;
        Self {
            seconds: self.seconds + (total / NANOS_PER_SECOND) as i64,
            nanos: (total % NANOS_PER_SECOND) as u32,
        }
    }

    /// This timestamp moved back by `duration`.
    pub fn minus(&self, duration: Duration) -> Self {
        let total = self.seconds as i128 * NANOS_PER_SECOND as i128 + self.nanos as i128
            - duration.as_nanos() as i128;
        Self {
            seconds: total.div_euclid(NANOS_PER_SECOND as i128) as i64,
            nanos: total.rem_euclid(NANOS_PER_SECOND as i128) as u32,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

/// Identity of one logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    pub account_id: AccountId,
    pub valid_start: Timestamp,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<i32>,
}

impl TransactionId {
    pub fn new(account_id: AccountId, valid_start: Timestamp) -> Self {
        Self {
            account_id,
            valid_start,
            scheduled: false,
            nonce: None,
        }
    }

    /// Generate a fresh id for `payer`, backdated by a random 8–13 seconds.
    pub fn generate(payer: AccountId) -> Self {
        let backdate = rand::thread_rng().gen_range(BACKDATE_MILLIS);
        let valid_start = Timestamp::now().minus(Duration::from_millis(backdate));
        Self::new(payer, valid_start)
    }

    /// The same identity with its valid start advanced by `nanos`.
    ///
    /// Chunk `i` (0-based) of a chunked operation uses `plus_nanos(i)`.
    pub fn plus_nanos(&self, nanos: u64) -> Self {
        Self {
            valid_start: self.valid_start.plus_nanos(nanos),
            ..self.clone()
        }
    }

    pub fn with_scheduled(mut self, scheduled: bool) -> Self {
        self.scheduled = scheduled;
        self
    }

    pub fn with_nonce(mut self, nonce: i32) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.account_id, self.valid_start)?;
        if self.scheduled {
            f.write_str("?scheduled")?;
        }
        if let Some(nonce) = self.nonce {
            write!(f, "/{}", nonce)?;
        }
        Ok(())
    }
}

impl FromStr for TransactionId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ClientError::Parse(format!("invalid transaction id: {:?}", s));

        let (account, rest) = s.split_once('@').ok_or_else(invalid)?;
        if account.is_empty() {
            return Err(invalid());
        }

        let (rest, nonce) = match rest.split_once('/') {
            Some((head, nonce)) => (head, Some(nonce.parse::<i32>().map_err(|_| invalid())?)),
            None => (rest, None),
        };

        let (rest, scheduled) = match rest.strip_suffix("?scheduled") {
            Some(head) => (head, true),
            None => (rest, false),
        };

        let (seconds, nanos) = rest.split_once('.').ok_or_else(invalid)?;
        let seconds = seconds.parse::<i64>().map_err(|_| invalid())?;
        let nanos = nanos.parse::<u32>().map_err(|_| invalid())?;
        if nanos as u64 >= NANOS_PER_SECOND {
            return Err(invalid());
        }

        Ok(Self {
            account_id: AccountId::new(account),
            valid_start: Timestamp { seconds, nanos },
            scheduled,
            nonce,
        })
    }
}
