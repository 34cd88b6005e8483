//! Distributed id generation
//!
//! Snowflake-style 64-bit ids: 41 bits of milliseconds since [`EPOCH_MS`],
//! 10 bits of node id and a 12-bit per-millisecond sequence. Ids from one
//! generator are strictly increasing per node. When the sequence overflows, or
//! the wall clock steps backwards, the generator borrows the next millisecond
//! instead of blocking.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{EngineError, Result};

/// 2020-01-01T00:00:00Z
pub const EPOCH_MS: i64 = 1_577_836_800_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

pub const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Default, Clone, Copy)]
struct NodeState {
    last_ms: i64,
    sequence: u16,
}

/// Thread-safe id source shared by every manager of an engine
#[derive(Debug)]
pub struct IdGenerator {
    default_node: u16,
    nodes: Mutex<HashMap<u16, NodeState>>,
}

impl IdGenerator {
    pub fn new(default_node: u16) -> Result<Self> {
        check_node(default_node)?;
        Ok(Self {
            default_node,
            nodes: Mutex::new(HashMap::new()),
        })
    }

    pub fn default_node(&self) -> u16 {
        self.default_node
    }

    /// Next integer id for `node` (the generator's default node when `None`)
    pub fn next_id(&self, node: Option<u16>) -> Result<i64> {
        let node = node.unwrap_or(self.default_node);
        check_node(node)?;

        let now = Utc::now().timestamp_millis() - EPOCH_MS;
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let state = nodes.entry(node).or_default();

        if now > state.last_ms {
            state.last_ms = now;
            state.sequence = 0;
        } else if state.sequence == MAX_SEQUENCE {
            state.last_ms += 1;
            state.sequence = 0;
        } else {
            state.sequence += 1;
        }

        Ok((state.last_ms << (NODE_BITS + SEQUENCE_BITS))
            | (i64::from(node) << SEQUENCE_BITS)
            | i64::from(state.sequence))
    }

    /// Decimal string form of [`IdGenerator::next_id`], for text primary keys
    pub fn next_string(&self, node: Option<u16>) -> Result<String> {
        self.next_id(node).map(|id| id.to_string())
    }
}

fn check_node(node: u16) -> Result<()> {
    if node > MAX_NODE {
        return Err(EngineError::validation(format!(
            "node id {} exceeds the maximum of {}",
            node, MAX_NODE
        )));
    }
    Ok(())
}

/// Split an id into (milliseconds since epoch, node, sequence)
pub fn decompose(id: i64) -> (i64, u16, u16) {
    let ms = id >> (NODE_BITS + SEQUENCE_BITS);
    let node = ((id >> SEQUENCE_BITS) & i64::from(MAX_NODE)) as u16;
    let sequence = (id & i64::from(MAX_SEQUENCE)) as u16;
    (ms, node, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_positive_and_unique() {
        let generator = IdGenerator::new(1).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = generator.next_id(None).unwrap();
            assert!(id > 0);
            assert!(seen.insert(id), "duplicate id {}", id);
        }
    }

    #[test]
    fn test_ids_increase_per_node() {
        let generator = IdGenerator::new(0).unwrap();
        let a = generator.next_id(Some(3)).unwrap();
        let b = generator.next_id(Some(3)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_node_is_encoded() {
        let generator = IdGenerator::new(0).unwrap();
        let id = generator.next_id(Some(513)).unwrap();
        let (ms, node, _) = decompose(id);
        assert_eq!(node, 513);
        assert!(ms > 0);
    }

    #[test]
    fn test_node_out_of_range() {
        assert!(IdGenerator::new(MAX_NODE + 1).is_err());
        let generator = IdGenerator::new(0).unwrap();
        assert!(generator.next_id(Some(MAX_NODE + 1)).is_err());
    }

    #[test]
    fn test_string_ids() {
        let generator = IdGenerator::new(2).unwrap();
        let id = generator.next_string(None).unwrap();
        assert!(id.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_concurrent_generation() {
        let generator = Arc::new(IdGenerator::new(7).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_id(None).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8_000);
    }
}
