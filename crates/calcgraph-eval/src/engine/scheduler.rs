use super::digraph::Graph;
use super::vertex::{Vertex, VertexId};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// One unit of work in a recalculation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleStep {
    Single(VertexId),
    /// A strongly connected component, listed in relaxation order.
    Cycle(Vec<VertexId>),
}

#[derive(Debug, Default)]
pub struct Schedule {
    pub steps: Vec<ScheduleStep>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn cycles(&self) -> impl Iterator<Item = &[VertexId]> {
        self.steps.iter().filter_map(|s| match s {
            ScheduleStep::Cycle(c) => Some(c.as_slice()),
            ScheduleStep::Single(_) => None,
        })
    }

    /// Every vertex in evaluation order, cycle members included.
    pub fn vertices(&self) -> Vec<VertexId> {
        self.steps
            .iter()
            .flat_map(|s| match s {
                ScheduleStep::Single(v) => std::slice::from_ref(v),
                ScheduleStep::Cycle(c) => c.as_slice(),
            })
            .copied()
            .collect()
    }
}

struct Frame {
    vertex: VertexId,
    successors: SmallVec<[VertexId; 8]>,
    next: usize,
}

/// Orders the part of the graph reachable from a set of roots.
///
/// Edges point from a precedent to its dependents, so a topological
/// order evaluates every vertex after everything it reads. Ties are
/// broken by address so that a pass is reproducible.
pub struct Scheduler<'a> {
    graph: &'a Graph<Vertex>,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a Graph<Vertex>) -> Self {
        Self { graph }
    }

    fn sort_key(&self, id: VertexId) -> (u32, u32, u32, u8, u32) {
        let (s, r, c, k) = self
            .graph
            .get(id)
            .map(Vertex::sort_key)
            .unwrap_or((u32::MAX, u32::MAX, u32::MAX, u8::MAX));
        (s, r, c, k, id.0)
    }

    fn sorted(&self, ids: impl Iterator<Item = VertexId>) -> SmallVec<[VertexId; 8]> {
        let mut out: SmallVec<[VertexId; 8]> = ids.collect();
        out.sort_by_key(|id| self.sort_key(*id));
        out
    }

    pub fn create_schedule(&self, roots: &[VertexId]) -> Schedule {
        let roots = self.sorted(roots.iter().copied().filter(|r| self.graph.contains(*r)));
        let sccs = self.tarjan_scc(&roots);
        let steps = sccs
            .into_iter()
            .rev()
            .map(|scc| {
                if scc.len() > 1 || self.graph.has_edge(scc[0], scc[0]) {
                    ScheduleStep::Cycle(self.relaxation_order(&scc))
                } else {
                    ScheduleStep::Single(scc[0])
                }
            })
            .collect();
        Schedule { steps }
    }

    /// Tarjan's algorithm over dependents, without recursion. Components
    /// come out sinks first.
    pub fn tarjan_scc(&self, roots: &[VertexId]) -> Vec<Vec<VertexId>> {
        let mut index_counter = 0usize;
        let mut indices: FxHashMap<VertexId, usize> = FxHashMap::default();
        let mut lowlinks: FxHashMap<VertexId, usize> = FxHashMap::default();
        let mut on_stack: FxHashSet<VertexId> = FxHashSet::default();
        let mut stack: Vec<VertexId> = Vec::new();
        let mut sccs = Vec::new();

        for &root in roots {
            if indices.contains_key(&root) {
                continue;
            }
            let mut frames = vec![self.enter(root, &mut index_counter, &mut indices, &mut lowlinks)];
            stack.push(root);
            on_stack.insert(root);

            while let Some(frame) = frames.last_mut() {
                if let Some(&next) = frame.successors.get(frame.next) {
                    frame.next += 1;
                    let v = frame.vertex;
                    if !indices.contains_key(&next) {
                        frames.push(self.enter(next, &mut index_counter, &mut indices, &mut lowlinks));
                        stack.push(next);
                        on_stack.insert(next);
                    } else if on_stack.contains(&next) {
                        let low = lowlinks[&v].min(indices[&next]);
                        lowlinks.insert(v, low);
                    }
                    continue;
                }

                let v = frame.vertex;
                frames.pop();
                if let Some(parent) = frames.last() {
                    let low = lowlinks[&parent.vertex].min(lowlinks[&v]);
                    lowlinks.insert(parent.vertex, low);
                }
                if lowlinks[&v] == indices[&v] {
                    let mut scc = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack.remove(&w);
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
        sccs
    }

    fn enter(
        &self,
        vertex: VertexId,
        counter: &mut usize,
        indices: &mut FxHashMap<VertexId, usize>,
        lowlinks: &mut FxHashMap<VertexId, usize>,
    ) -> Frame {
        indices.insert(vertex, *counter);
        lowlinks.insert(vertex, *counter);
        *counter += 1;
        Frame {
            vertex,
            successors: self.sorted(self.graph.dependents(vertex)),
            next: 0,
        }
    }

    /// Order in which a cyclic component is relaxed: depth-first from
    /// its first member by address, following precedents inside the
    /// component, each vertex emitted after the precedents it reached.
    /// For `A1=B1+1, B1=A1+1` this yields `B1, A1`.
    pub fn relaxation_order(&self, scc: &[VertexId]) -> Vec<VertexId> {
        let members: FxHashSet<VertexId> = scc.iter().copied().collect();
        let starts = self.sorted(scc.iter().copied());
        let mut visited: FxHashSet<VertexId> = FxHashSet::default();
        let mut order = Vec::with_capacity(scc.len());

        for &start in &starts {
            if !visited.insert(start) {
                continue;
            }
            let mut frames = vec![Frame {
                vertex: start,
                successors: self.precedents_within(start, &members),
                next: 0,
            }];
            while let Some(frame) = frames.last_mut() {
                if let Some(&next) = frame.successors.get(frame.next) {
                    frame.next += 1;
                    if visited.insert(next) {
                        frames.push(Frame {
                            vertex: next,
                            successors: self.precedents_within(next, &members),
                            next: 0,
                        });
                    }
                    continue;
                }
                order.push(frame.vertex);
                frames.pop();
            }
        }
        order
    }

    fn precedents_within(
        &self,
        vertex: VertexId,
        members: &FxHashSet<VertexId>,
    ) -> SmallVec<[VertexId; 8]> {
        self.sorted(
            self.graph
                .dependencies(vertex)
                .filter(|p| *p != vertex && members.contains(p)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::vertex::{Formula, FormulaCell};
    use calcgraph_common::CellAddress;
    use calcgraph_parse::parse;
    use std::sync::Arc;

    fn formula(g: &mut Graph<Vertex>, row: u32) -> VertexId {
        let addr = CellAddress::new(0, row, 0);
        let ast = Arc::new(parse("=1").unwrap());
        g.add_node(Vertex::Formula(FormulaCell::new(addr, 0, Formula::Parsed(ast))))
    }

    #[test]
    fn chain_is_topological() {
        let mut g = Graph::new();
        let a = formula(&mut g, 0);
        let b = formula(&mut g, 1);
        let c = formula(&mut g, 2);
        g.add_edge(a, b);
        g.add_edge(b, c);
        g.add_edge(a, c);
        let schedule = Scheduler::new(&g).create_schedule(&[a]);
        assert_eq!(schedule.vertices(), vec![a, b, c]);
        assert_eq!(schedule.cycles().count(), 0);
    }

    #[test]
    fn two_cycle_relaxes_second_member_first() {
        let mut g = Graph::new();
        let a = formula(&mut g, 0);
        let b = formula(&mut g, 1);
        let d = formula(&mut g, 5);
        g.add_edge(a, b);
        g.add_edge(b, a);
        g.add_edge(a, d);
        let schedule = Scheduler::new(&g).create_schedule(&[a]);
        assert_eq!(
            schedule.steps,
            vec![ScheduleStep::Cycle(vec![b, a]), ScheduleStep::Single(d)]
        );
    }

    #[test]
    fn three_cycle_order_follows_precedents() {
        // A reads B, B reads C, C reads A.
        let mut g = Graph::new();
        let a = formula(&mut g, 0);
        let b = formula(&mut g, 1);
        let c = formula(&mut g, 2);
        g.add_edge(b, a);
        g.add_edge(c, b);
        g.add_edge(a, c);
        let schedule = Scheduler::new(&g).create_schedule(&[b]);
        assert_eq!(schedule.steps, vec![ScheduleStep::Cycle(vec![c, b, a])]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = Graph::new();
        let a = formula(&mut g, 0);
        g.add_edge(a, a);
        let schedule = Scheduler::new(&g).create_schedule(&[a]);
        assert_eq!(schedule.steps, vec![ScheduleStep::Cycle(vec![a])]);
    }
}
