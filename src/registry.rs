//! # Node Registry
//!
//! Fixed set of slots holding the latest [`NodeRecord`] of each node heard by the
//! gateway. A node keeps the slot it was first assigned for the life of the registry;
//! later records from the same node overwrite that slot in place. Once every slot is
//! taken, records from unseen nodes are rejected with [`RegistryError::Full`] and the
//! registry is left unchanged.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::constants::{DEFAULT_NODE_CAPACITY, EMPTY_NODE_ID};
use crate::payload::record::NodeRecord;

/// Position of a slot in the registry
pub type SlotIndex = usize;

/// Registry shared between the polling context and telemetry readers
pub type SharedRegistry = Arc<Mutex<NodeRegistry>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry full ({capacity} slots), node 0x{node_id:02X} not stored")]
    Full { capacity: usize, node_id: u8 },

    #[error("node id 0x00 is reserved for empty slots")]
    ReservedNodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRegistry {
    slots: Vec<Option<NodeRecord>>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NODE_CAPACITY)
    }
}

impl NodeRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        NodeRegistry {
            slots: vec![None; capacity],
        }
    }

    /// Store `record` in its node's slot, allocating the first free slot for a new node.
    pub fn upsert(&mut self, record: NodeRecord) -> Result<SlotIndex, RegistryError> {
        if record.node_id == EMPTY_NODE_ID {
            return Err(RegistryError::ReservedNodeId);
        }

        let index = self
            .index_of(record.node_id)
            .or_else(|| self.slots.iter().position(Option::is_none))
            .ok_or(RegistryError::Full {
                capacity: self.capacity(),
                node_id: record.node_id,
            })?;

        self.slots[index] = Some(record);
        Ok(index)
    }

    pub fn lookup(&self, node_id: u8) -> Option<NodeRecord> {
        self.index_of(node_id).and_then(|index| self.slots[index])
    }

    fn index_of(&self, node_id: u8) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|record| record.node_id == node_id))
    }

    /// Record held by a slot, `None` for empty or out-of-range slots
    pub fn slot(&self, index: SlotIndex) -> Option<&NodeRecord> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Occupied slots in slot order
    pub fn iter_occupied(&self) -> impl Iterator<Item = (SlotIndex, &NodeRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|record| (index, record)))
    }

    pub fn for_each_occupied<F>(&self, mut f: F)
    where
        F: FnMut(SlotIndex, &NodeRecord),
    {
        for (index, record) in self.iter_occupied() {
            f(index, record);
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.iter_occupied().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Telemetry view of the occupied slots
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            generated_at: Utc::now(),
            capacity: self.capacity(),
            nodes: self
                .iter_occupied()
                .map(|(slot, record)| NodeEntry {
                    slot,
                    params_hex: crate::util::hex::encode_hex_upper(&record.params),
                    record: *record,
                })
                .collect(),
        }
    }
}

/// Point-in-time report of the registry, ready for publishing
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub generated_at: DateTime<Utc>,
    pub capacity: usize,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeEntry {
    pub slot: SlotIndex,
    #[serde(flatten)]
    pub record: NodeRecord,
    pub params_hex: String,
}

impl RegistrySnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
