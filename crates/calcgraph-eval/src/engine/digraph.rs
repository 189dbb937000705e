//! Arena-backed directed graph with adjacency sets in both directions.
//!
//! Edges point from a dependency to its dependent. Slots of removed
//! nodes are recycled.

use crate::engine::vertex::VertexId;
use rustc_hash::FxHashSet;

#[derive(Debug)]
struct Node<T> {
    data: T,
    incoming: FxHashSet<VertexId>,
    outgoing: FxHashSet<VertexId>,
}

#[derive(Debug)]
pub struct Graph<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<u32>,
    len: usize,
    edges: usize,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            edges: 0,
        }
    }
}

impl<T> Graph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, data: T) -> VertexId {
        let node = Node {
            data,
            incoming: FxHashSet::default(),
            outgoing: FxHashSet::default(),
        };
        self.len += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                VertexId::new(slot)
            }
            None => {
                self.slots.push(Some(node));
                VertexId::new((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: VertexId) -> Option<T> {
        let node = self.slots.get_mut(id.as_index())?.take()?;
        for from in &node.incoming {
            if *from != id {
                if let Some(n) = self.node_mut(*from) {
                    n.outgoing.remove(&id);
                }
            }
            self.edges -= 1;
        }
        for to in &node.outgoing {
            if *to != id {
                if let Some(n) = self.node_mut(*to) {
                    n.incoming.remove(&id);
                }
                self.edges -= 1;
            }
        }
        self.free.push(id.0);
        self.len -= 1;
        Some(node.data)
    }

    fn node(&self, id: VertexId) -> Option<&Node<T>> {
        self.slots.get(id.as_index()).and_then(|s| s.as_ref())
    }

    fn node_mut(&mut self, id: VertexId) -> Option<&mut Node<T>> {
        self.slots.get_mut(id.as_index()).and_then(|s| s.as_mut())
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: VertexId) -> Option<&T> {
        self.node(id).map(|n| &n.data)
    }

    pub fn get_mut(&mut self, id: VertexId) -> Option<&mut T> {
        self.node_mut(id).map(|n| &mut n.data)
    }

    /// Returns false when the edge already existed or an endpoint is missing.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        let inserted = self
            .node_mut(from)
            .is_some_and(|n| n.outgoing.insert(to));
        if inserted {
            if let Some(n) = self.node_mut(to) {
                n.incoming.insert(from);
            }
            self.edges += 1;
        }
        inserted
    }

    pub fn remove_edge(&mut self, from: VertexId, to: VertexId) -> bool {
        let removed = self
            .node_mut(from)
            .is_some_and(|n| n.outgoing.remove(&to));
        if removed {
            if let Some(n) = self.node_mut(to) {
                n.incoming.remove(&from);
            }
            self.edges -= 1;
        }
        removed
    }

    pub fn has_edge(&self, from: VertexId, to: VertexId) -> bool {
        self.node(from).is_some_and(|n| n.outgoing.contains(&to))
    }

    /// Vertices that depend on `id`.
    pub fn dependents(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.node(id).into_iter().flat_map(|n| n.outgoing.iter().copied())
    }

    /// Vertices `id` depends on.
    pub fn dependencies(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.node(id).into_iter().flat_map(|n| n.incoming.iter().copied())
    }

    pub fn in_degree(&self, id: VertexId) -> usize {
        self.node(id).map_or(0, |n| n.incoming.len())
    }

    pub fn out_degree(&self, id: VertexId) -> usize {
        self.node(id).map_or(0, |n| n.outgoing.len())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|n| (VertexId::new(i as u32), &n.data)))
    }

    pub fn ids(&self) -> Vec<VertexId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removing_a_node_drops_its_edges() {
        let mut g: Graph<&str> = Graph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        assert!(g.add_edge(a, b));
        assert!(g.add_edge(b, c));
        assert!(!g.add_edge(a, b));
        assert_eq!(g.edge_count(), 2);

        assert_eq!(g.remove_node(b), Some("b"));
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.out_degree(a), 0);
        assert_eq!(g.in_degree(c), 0);
    }

    #[test]
    fn slots_are_recycled() {
        let mut g: Graph<u8> = Graph::new();
        let a = g.add_node(1);
        g.remove_node(a);
        let b = g.add_node(2);
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
        assert_eq!(g.get(b), Some(&2));
    }

    #[test]
    fn self_loops_count_once() {
        let mut g: Graph<u8> = Graph::new();
        let a = g.add_node(1);
        assert!(g.add_edge(a, a));
        assert_eq!(g.edge_count(), 1);
        g.remove_node(a);
        assert_eq!(g.edge_count(), 0);
    }
}
