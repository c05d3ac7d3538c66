//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use ledger_client_engine::backoff::{BackoffPolicy, ExponentialBackoff};
use ledger_client_engine::network::NetworkSettings;
use ledger_client_engine::node::{HealthSnapshot, NodeBackoff};
use ledger_client_engine::transaction::chunk::{chunk_info, chunk_transaction_id, required_chunks, split};
use ledger_client_engine::{
    AccountId, Consensus, InProcessConnector, Network, Node, NodeAddress, Timestamp, TransactionId,
};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn network(max_nodes_per_request: Option<usize>) -> Network<Consensus> {
    let settings = NetworkSettings {
        max_nodes_per_request,
        ..NetworkSettings::default()
    };
    Network::new(Arc::new(InProcessConnector::new()), settings)
}

// =============================================================================
// Selection Count Properties
// =============================================================================

proptest! {
    /// A request fans out to a third of the pool, rounded up.
    #[test]
    fn selection_count_is_third_rounded_up(total in 1usize..500) {
        let count = network(None).nodes_for_request(total);
        prop_assert!(count >= 1);
        prop_assert!(count <= total);
        prop_assert!(count * 3 >= total);
        prop_assert!((count - 1) * 3 < total);
    }

    /// Growing the pool never shrinks the fan-out.
    #[test]
    fn selection_count_is_monotonic(total in 1usize..500, extra in 0usize..100) {
        let net = network(None);
        prop_assert!(net.nodes_for_request(total) <= net.nodes_for_request(total + extra));
    }

    /// A fixed fan-out is clamped to the pool size.
    #[test]
    fn fixed_selection_count_is_clamped(total in 1usize..100, width in 1usize..100) {
        prop_assert_eq!(network(Some(width)).nodes_for_request(total), width.min(total));
    }
}

// =============================================================================
// Node Delay Properties
// =============================================================================

proptest! {
    /// The delay stays in [min, max] under any mix of failures and successes.
    #[test]
    fn node_delay_stays_within_bounds(events in prop::collection::vec(any::<bool>(), 0..64)) {
        let backoff = NodeBackoff::default();
        let node: Node<Consensus> = Node::new(
            AccountId::new("0.0.3"),
            NodeAddress::in_process("node-3"),
            backoff,
            Arc::new(InProcessConnector::new()),
        );

        for failed in events {
            let before = node.delay();
            if failed {
                node.on_failure();
                prop_assert!(node.delay() >= before);
            } else {
                node.on_success();
                prop_assert!(node.delay() <= before);
            }
            prop_assert!(node.delay() >= backoff.min);
            prop_assert!(node.delay() <= backoff.max);
        }
    }
}

// =============================================================================
// Selection Order Properties
// =============================================================================

fn snapshot() -> impl Strategy<Value = HealthSnapshot> {
    (any::<bool>(), 0u64..4, 0u64..4).prop_map(|(healthy, use_count, last_used_ms)| HealthSnapshot {
        healthy,
        use_count,
        last_used_ms,
        delay_until_ms: 0,
    })
}

proptest! {
    /// Comparison is antisymmetric.
    #[test]
    fn selection_order_antisymmetric(a in snapshot(), b in snapshot()) {
        prop_assert_eq!(a.selection_order(&b), b.selection_order(&a).reverse());
    }

    /// Comparison is transitive, including for ties.
    #[test]
    fn selection_order_transitive(a in snapshot(), b in snapshot(), c in snapshot()) {
        let ab = a.selection_order(&b);
        let bc = b.selection_order(&c);
        if ab != Ordering::Greater && bc != Ordering::Greater {
            prop_assert_ne!(a.selection_order(&c), Ordering::Greater);
        }
        if ab == Ordering::Equal && bc == Ordering::Equal {
            prop_assert_eq!(a.selection_order(&c), Ordering::Equal);
        }
    }

    /// Sorting puts every healthy node ahead of every unhealthy one.
    #[test]
    fn sorted_snapshots_are_healthy_first(mut snapshots in prop::collection::vec(snapshot(), 0..32)) {
        snapshots.sort_by(|a, b| a.selection_order(b));
        let first_unhealthy = snapshots.iter().position(|s| !s.healthy).unwrap_or(snapshots.len());
        prop_assert!(snapshots[first_unhealthy..].iter().all(|s| !s.healthy));
    }
}

// =============================================================================
// Chunking Properties
// =============================================================================

proptest! {
    /// Chunks reassemble to the input; only the last may be short.
    #[test]
    fn split_reassembles(data in prop::collection::vec(any::<u8>(), 0..2048), size in 1usize..256) {
        let chunks = split(&data, size, usize::MAX).unwrap();
        prop_assert_eq!(chunks.len(), required_chunks(data.len(), size));
        prop_assert_eq!(chunks.concat(), data.clone());

        let (last, rest) = chunks.split_last().unwrap();
        prop_assert!(rest.iter().all(|c| c.len() == size));
        prop_assert!(last.len() <= size);
        prop_assert!(!last.is_empty() || data.is_empty());
    }

    /// Splitting fails exactly when the chunk count exceeds the limit.
    #[test]
    fn split_respects_max_chunks(len in 0usize..512, size in 1usize..64, max in 1usize..16) {
        let data = vec![7u8; len];
        let result = split(&data, size, max);
        prop_assert_eq!(result.is_ok(), required_chunks(len, size) <= max);
    }

    /// Chunk ids strictly increase and keep the payer.
    #[test]
    fn chunk_ids_strictly_increase(seconds in 0i64..4_000_000_000, nanos in 0u32..1_000_000_000, total in 1usize..40) {
        let initial = TransactionId::new(AccountId::new("0.0.1001"), Timestamp::new(seconds, nanos));
        let ids: Vec<TransactionId> = (0..total).map(|i| chunk_transaction_id(&initial, i)).collect();

        prop_assert_eq!(&ids[0], &initial);
        for pair in ids.windows(2) {
            prop_assert!(pair[0].valid_start < pair[1].valid_start);
            prop_assert_eq!(&pair[0].account_id, &pair[1].account_id);
        }
        for i in 0..total {
            let info = chunk_info(&initial, i, total);
            prop_assert_eq!(info.number as usize, i + 1);
            prop_assert_eq!(&info.initial_transaction_id, &initial);
        }
    }
}

// =============================================================================
// Backoff Properties
// =============================================================================

proptest! {
    /// Every delay is a multiple of the base within the attempt's bounds.
    #[test]
    fn backoff_within_bounds(attempt in 0u32..64, base_ms in 1u64..1000, capped in any::<bool>()) {
        let base = Duration::from_millis(base_ms);
        let max = capped.then(|| Duration::from_secs(8));
        let backoff = ExponentialBackoff::new(base, max);

        let (low, high) = backoff.bounds(attempt);
        let delay = backoff.delay(attempt);
        prop_assert!(delay >= low);
        prop_assert!(delay <= high);
        if let Some(max) = max {
            prop_assert!(delay <= max);
        }
        if delay < max.unwrap_or(Duration::MAX) {
            prop_assert_eq!(delay.as_nanos() % base.as_nanos(), 0);
        }
    }
}
