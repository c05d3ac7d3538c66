//! Splitting oversized payloads into chunks.
//!
//! ```text
//! data: [━━━━━━━━ 1024 ━━━━━━━━|━━━━━━━━ 1024 ━━━━━━━━|━━ 300 ━━]
//!        chunk 1/3               chunk 2/3               chunk 3/3
//!        id = initial            id = initial + 1ns      id = initial + 2ns
//! ```
//!
//! Every chunk carries the initial transaction id so the network can stitch
//! the pieces back together.

use crate::config::ChunkingConfig;
use crate::error::{ClientError, Result};
use crate::ids::TransactionId;
use crate::wire::ChunkInfo;

/// Per-transaction chunking overrides. Unset sizes fall back to the
/// client's [`ChunkingConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkSettings {
    pub chunk_size: Option<usize>,
    pub max_chunks: Option<usize>,
    /// Poll each chunk's receipt before sending the next one.
    pub wait_for_receipt: bool,
}

impl ChunkSettings {
    /// Effective `(chunk_size, max_chunks)`.
    pub fn resolve(&self, defaults: &ChunkingConfig) -> (usize, usize) {
        (
            self.chunk_size.unwrap_or(defaults.chunk_size),
            self.max_chunks.unwrap_or(defaults.max_chunks),
        )
    }
}

/// Number of chunks needed for `len` bytes. Empty payloads still take one.
pub fn required_chunks(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size).max(1)
}

/// Split `data` into at most `max_chunks` pieces of `chunk_size` bytes.
pub fn split(data: &[u8], chunk_size: usize, max_chunks: usize) -> Result<Vec<&[u8]>> {
    if chunk_size == 0 {
        return Err(ClientError::Config("chunk size must be at least 1".into()));
    }
    let required = required_chunks(data.len(), chunk_size);
    if required > max_chunks {
        return Err(ClientError::Config(format!(
            "payload of {} bytes needs {} chunks of {} bytes but at most {} are allowed",
            data.len(),
            required,
            chunk_size,
            max_chunks
        )));
    }
    if data.is_empty() {
        return Ok(vec![data]);
    }
    Ok(data.chunks(chunk_size).collect())
}

/// Transaction id of chunk `index` (0-based).
pub fn chunk_transaction_id(initial: &TransactionId, index: usize) -> TransactionId {
    initial.plus_nanos(index as u64)
}

/// Chunk metadata for chunk `index` (0-based) of `total`.
pub fn chunk_info(initial: &TransactionId, index: usize, total: usize) -> ChunkInfo {
    ChunkInfo {
        initial_transaction_id: initial.clone(),
        number: index as u32 + 1,
        total: total as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AccountId, Timestamp};

    #[test]
    fn test_required_chunks() {
        assert_eq!(required_chunks(0, 1024), 1);
        assert_eq!(required_chunks(1, 1024), 1);
        assert_eq!(required_chunks(1024, 1024), 1);
        assert_eq!(required_chunks(1025, 1024), 2);
        assert_eq!(required_chunks(3000, 1024), 3);
    }

    #[test]
    fn test_split_sizes() {
        let data = vec![7u8; 3000];
        let chunks = split(&data, 1024, 20).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1024, 1024, 952]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn test_split_empty_is_one_chunk() {
        let chunks = split(&[], 1024, 1).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn test_split_too_many_chunks() {
        let data = vec![0u8; 21 * 10];
        assert!(split(&data, 10, 21).is_ok());
        let err = split(&data, 10, 20).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_split_zero_chunk_size() {
        assert!(matches!(split(b"abc", 0, 20), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_chunk_ids_and_info() {
        let initial = TransactionId::new(AccountId::new("0.0.2"), Timestamp::new(100, 999_999_999));
        let second = chunk_transaction_id(&initial, 1);
        assert_eq!(second.valid_start, Timestamp::new(101, 0));
        assert_eq!(chunk_transaction_id(&initial, 0), initial);

        let info = chunk_info(&initial, 2, 3);
        assert_eq!(info.number, 3);
        assert_eq!(info.total, 3);
        assert_eq!(info.initial_transaction_id, initial);
    }

    #[test]
    fn test_settings_resolve() {
        let defaults = ChunkingConfig::default();
        assert_eq!(ChunkSettings::default().resolve(&defaults), (1024, 20));
        let custom = ChunkSettings {
            chunk_size: Some(10),
            max_chunks: None,
            wait_for_receipt: true,
        };
        assert_eq!(custom.resolve(&defaults), (10, 20));
    }
}
