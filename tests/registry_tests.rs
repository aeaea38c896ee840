//! Integration tests for the fixed-capacity node registry.

use e5_gateway::payload::NodeRecord;
use e5_gateway::registry::{NodeRegistry, RegistryError};
use proptest::prelude::*;

fn record(node_id: u8, response_id: u8) -> NodeRecord {
    NodeRecord::new(response_id, node_id, [response_id; 6])
}

/// Three distinct nodes fill a three-slot registry; a fourth is rejected.
#[test]
fn test_fourth_node_rejected_when_full() {
    let mut registry = NodeRegistry::with_capacity(3);
    assert_eq!(registry.upsert(record(0x10, 1)), Ok(0));
    assert_eq!(registry.upsert(record(0x11, 1)), Ok(1));
    assert_eq!(registry.upsert(record(0x12, 1)), Ok(2));
    assert!(registry.is_full());

    let before = registry.clone();
    assert_eq!(
        registry.upsert(record(0x13, 1)),
        Err(RegistryError::Full {
            capacity: 3,
            node_id: 0x13
        })
    );
    assert_eq!(registry, before);
    assert_eq!(registry.lookup(0x13), None);
}

/// Tests that a known node still updates once the registry is full.
#[test]
fn test_known_node_updates_when_full() {
    let mut registry = NodeRegistry::default();
    for node in [0x10, 0x11, 0x12] {
        registry.upsert(record(node, 1)).unwrap();
    }

    assert_eq!(registry.upsert(record(0x11, 7)), Ok(1));
    assert_eq!(registry.lookup(0x11), Some(record(0x11, 7)));
}

/// Tests that iteration visits occupied slots in slot order.
#[test]
fn test_for_each_occupied_in_slot_order() {
    let mut registry = NodeRegistry::with_capacity(4);
    registry.upsert(record(0x22, 1)).unwrap();
    registry.upsert(record(0x21, 1)).unwrap();

    let mut seen = Vec::new();
    registry.for_each_occupied(|slot, record| seen.push((slot, record.node_id)));
    assert_eq!(seen, vec![(0, 0x22), (1, 0x21)]);
    assert_eq!(registry.slot(2), None);
    assert_eq!(registry.slot(9), None);
}

/// Tests that the snapshot lists every occupied slot.
#[test]
fn test_snapshot_lists_nodes() {
    let mut registry = NodeRegistry::default();
    registry.upsert(record(0x10, 0x59)).unwrap();
    let snapshot = registry.snapshot();

    assert_eq!(snapshot.capacity, 3);
    assert_eq!(snapshot.nodes.len(), 1);
    assert_eq!(snapshot.nodes[0].params_hex, "595959595959");
    assert!(snapshot.to_json().unwrap().contains("\"node_id\":16"));
}

proptest! {
    #[test]
    fn prop_upsert_is_idempotent(node_id in 1u8..=255, response_id in any::<u8>()) {
        let mut once = NodeRegistry::default();
        once.upsert(record(node_id, response_id)).unwrap();

        let mut twice = once.clone();
        twice.upsert(record(node_id, response_id)).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_capacity_bound(
        node_ids in proptest::collection::vec(1u8..=255, 0..32),
        capacity in 0usize..6,
    ) {
        let mut registry = NodeRegistry::with_capacity(capacity);
        let mut distinct: Vec<u8> = Vec::new();

        for node_id in node_ids {
            let result = registry.upsert(record(node_id, 0));
            if !distinct.contains(&node_id) && distinct.len() < capacity {
                distinct.push(node_id);
            }
            prop_assert_eq!(result.is_ok(), distinct.contains(&node_id));
        }

        prop_assert!(registry.len() <= capacity);
        prop_assert_eq!(registry.len(), distinct.len());
    }
}
