//! Immutable node-to-weight mapping for one consensus round.

use crate::{NodeId, Weight};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The voting-weight table of one snapshot.
///
/// Fixed at construction and never mutated afterwards, which is what lets
/// records share it across threads without locking. Each round may carry its
/// own table, so the table travels with the snapshot rather than living in
/// the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTable {
    /// Weight per member. BTreeMap for deterministic iteration order.
    weights: BTreeMap<NodeId, Weight>,
    /// Sum of all weights, precomputed at construction.
    total: u64,
}

impl WeightTable {
    /// Build a table from `(node, weight)` pairs.
    ///
    /// A duplicate node id keeps the last weight given for it.
    pub fn new(entries: impl IntoIterator<Item = (NodeId, Weight)>) -> Self {
        let weights: BTreeMap<NodeId, Weight> = entries.into_iter().collect();
        let total = weights.values().map(|w| w.get()).sum();
        Self { weights, total }
    }

    /// Build a table where every listed node has the same weight.
    pub fn uniform(nodes: impl IntoIterator<Item = NodeId>, weight: Weight) -> Self {
        Self::new(nodes.into_iter().map(|n| (n, weight)))
    }

    /// Look up the weight of a member.
    pub fn weight_of(&self, node: NodeId) -> Option<Weight> {
        self.weights.get(&node).copied()
    }

    /// Check whether a node is in the table.
    pub fn contains(&self, node: NodeId) -> bool {
        self.weights.contains_key(&node)
    }

    /// Total weight of all members.
    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterate over `(node, weight)` entries in node-id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Weight)> + '_ {
        self.weights.iter().map(|(n, w)| (*n, *w))
    }

    /// Iterate over member ids in order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.weights.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_total() {
        let table = WeightTable::new([
            (NodeId(0), Weight(3)),
            (NodeId(1), Weight(2)),
            (NodeId(2), Weight(0)),
        ]);

        assert_eq!(table.len(), 3);
        assert_eq!(table.total_weight(), 5);
        assert_eq!(table.weight_of(NodeId(0)), Some(Weight(3)));
        assert_eq!(table.weight_of(NodeId(2)), Some(Weight(0)));
        assert_eq!(table.weight_of(NodeId(9)), None);
        assert!(table.contains(NodeId(1)));
        assert!(!table.contains(NodeId(9)));
    }

    #[test]
    fn test_duplicate_keeps_last() {
        let table = WeightTable::new([(NodeId(0), Weight(1)), (NodeId(0), Weight(7))]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.weight_of(NodeId(0)), Some(Weight(7)));
        assert_eq!(table.total_weight(), 7);
    }

    #[test]
    fn test_uniform() {
        let table = WeightTable::uniform((0..4).map(NodeId), Weight(1));

        assert_eq!(table.len(), 4);
        assert_eq!(table.total_weight(), 4);
        for id in 0..4 {
            assert_eq!(table.weight_of(NodeId(id)), Some(Weight(1)));
        }
    }

    #[test]
    fn test_iteration_is_ordered() {
        let table = WeightTable::new([
            (NodeId(5), Weight(1)),
            (NodeId(1), Weight(1)),
            (NodeId(3), Weight(1)),
        ]);

        let ids: Vec<_> = table.node_ids().collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(3), NodeId(5)]);
    }
}
