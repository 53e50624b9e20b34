//! Bijection between node names and dense integer indices. Node `"0"` is
//! always ground, mapped to index `0`.

use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct NodeTable {
    table: HashMap<String, NodeId>,
    names: Vec<String>,
}

impl NodeTable {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert("0".to_string(), 0);
        NodeTable {
            table,
            names: vec!["0".to_string()],
        }
    }

    /// Returns the id for `name`, assigning a fresh one in first-seen order
    /// if it hasn't been registered yet.
    pub fn append_node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.table.get(name) {
            return id;
        }
        let id = self.table.len();
        self.table.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.table.get(name).copied()
    }

    pub fn get_node_name(&self, id: NodeId) -> Option<&str> {
        self.names.get(id).map(|s| s.as_str())
    }

    /// Total number of nodes, including ground.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        false // ground is always present
    }

    /// Non-ground node names, in ascending id order (1..N-1).
    pub fn non_ground_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().skip(1).map(|s| s.as_str())
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_is_preseeded() {
        let table = NodeTable::new();
        assert_eq!(table.find_node("0"), Some(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn first_seen_order() {
        let mut table = NodeTable::new();
        assert_eq!(table.append_node("1"), 1);
        assert_eq!(table.append_node("2"), 2);
        assert_eq!(table.append_node("1"), 1);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get_node_name(2), Some("2"));
    }

    #[test]
    fn unknown_node_is_none() {
        let table = NodeTable::new();
        assert_eq!(table.find_node("7"), None);
    }
}
