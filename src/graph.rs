use std::ops::{Deref, DerefMut};

use derive_more::Display;
use log::trace;
use typed_index_collections::{TiSlice, TiVec};

use crate::{
    intervals::ResourceUseIndex,
    problem::{Problem, Route, TrainId},
};

/// Dense index of an operation that is part of some train's path.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display(fmt = "op{}", _0)]
pub struct OpId(pub u32);

impl From<OpId> for usize {
    fn from(v: OpId) -> Self {
        v.0 as usize
    }
}

impl From<usize> for OpId {
    fn from(x: usize) -> Self {
        OpId(x as u32)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EdgeKind {
    /// Sequencing within one train's route.
    Path,
    /// Ordering between two trains holding the same resource.
    Disjunctive,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Edge {
    pub to: OpId,
    pub weight: i32,
    pub kind: EdgeKind,
}

#[derive(Clone, Debug)]
pub struct OpNode {
    pub train: TrainId,
    pub op_idx: usize,
    pub duration: i32,
    pub start_lb: i32,
    pub start_ub: Option<i32>,
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum GraphError {
    #[display(fmt = "edge {} -> {} already exists", from, to)]
    DuplicateEdge { from: OpId, to: OpId },
    #[display(fmt = "edge {} -> {} does not exist", from, to)]
    EdgeNotFound { from: OpId, to: OpId },
    #[display(fmt = "train {} has no operation {}", train, op)]
    UnknownOperation { train: TrainId, op: usize },
    #[display(fmt = "train {} was already added", _0)]
    DuplicateTrain(TrainId),
}

/// How to take back one [`PrecedenceGraph::constrain`] call.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EdgeUndo {
    pub from: OpId,
    pub to: OpId,
    /// `None` if the edge was inserted, otherwise the weight it had before.
    pub previous_weight: Option<i32>,
}

/// Directed graph over all path operations of all trains, with the resource holds
/// of every path folded into a [`ResourceUseIndex`].
#[derive(Clone, Debug, Default)]
pub struct PrecedenceGraph {
    nodes: TiVec<OpId, OpNode>,
    succ: TiVec<OpId, Vec<Edge>>,
    in_degree: TiVec<OpId, u32>,
    paths: Vec<(TrainId, Vec<OpId>)>,
    resource_uses: ResourceUseIndex,
    n_edges: usize,
}

impl PrecedenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_routes(problem: &Problem, routes: &[Route]) -> Result<Self, GraphError> {
        let _p = hprof::enter("build graph");
        let mut graph = Self::new();
        for route in routes {
            graph.add_path(problem, route)?;
        }
        Ok(graph)
    }

    /// Insert the operations of `route` as a chain of path edges, each weighted by the
    /// duration of its source operation, and record the route's resource holds.
    pub fn add_path(&mut self, problem: &Problem, route: &Route) -> Result<(), GraphError> {
        if self.paths.iter().any(|(t, _)| *t == route.train) {
            return Err(GraphError::DuplicateTrain(route.train));
        }

        let operations = &problem
            .trains
            .get(route.train)
            .ok_or(GraphError::UnknownOperation {
                train: route.train,
                op: route.ops.first().copied().unwrap_or(0),
            })?
            .operations;

        if let Some(&op) = route.ops.iter().find(|&&op| op >= operations.len()) {
            return Err(GraphError::UnknownOperation {
                train: route.train,
                op,
            });
        }

        let ids = route
            .ops
            .iter()
            .map(|&op_idx| {
                let op = &operations[op_idx];
                self.succ.push(Vec::new());
                self.in_degree.push(0);
                self.nodes.push_and_get_key(OpNode {
                    train: route.train,
                    op_idx,
                    duration: op.duration,
                    start_lb: op.start_lb,
                    start_ub: op.start_ub,
                })
            })
            .collect::<Vec<_>>();

        for (pos, (&op_idx, &id)) in route.ops.iter().zip(ids.iter()).enumerate() {
            let op = &operations[op_idx];
            let next = ids.get(pos + 1).copied();

            if let Some(next) = next {
                self.insert_edge(id, next, op.duration, EdgeKind::Path)?;
            }

            for usage in op.resources.iter() {
                self.resource_uses
                    .add(usage.resource, route.train, id, next, usage.release_time);
            }
        }

        trace!("Added path of {} with {} operations", route.train, ids.len());
        self.paths.push((route.train, ids));
        Ok(())
    }

    /// Insert a disjunctive edge. Callers must not insert the same edge twice.
    pub fn add_edge(&mut self, from: OpId, to: OpId, weight: i32) -> Result<(), GraphError> {
        self.insert_edge(from, to, weight, EdgeKind::Disjunctive)
    }

    fn insert_edge(
        &mut self,
        from: OpId,
        to: OpId,
        weight: i32,
        kind: EdgeKind,
    ) -> Result<(), GraphError> {
        if self.edge(from, to).is_some() {
            return Err(GraphError::DuplicateEdge { from, to });
        }
        self.succ[from].push(Edge { to, weight, kind });
        self.in_degree[to] += 1;
        self.n_edges += 1;
        Ok(())
    }

    pub fn remove_edge(&mut self, from: OpId, to: OpId) -> Result<Edge, GraphError> {
        let idx = self.succ[from]
            .iter()
            .position(|e| e.to == to)
            .ok_or(GraphError::EdgeNotFound { from, to })?;
        let edge = self.succ[from].swap_remove(idx);
        self.in_degree[to] -= 1;
        self.n_edges -= 1;
        Ok(edge)
    }

    /// Replace the weight of an existing edge, returning the old weight.
    pub fn set_edge_weight(&mut self, from: OpId, to: OpId, weight: i32) -> Result<i32, GraphError> {
        let edge = self.succ[from]
            .iter_mut()
            .find(|e| e.to == to)
            .ok_or(GraphError::EdgeNotFound { from, to })?;
        Ok(std::mem::replace(&mut edge.weight, weight))
    }

    /// Require `start[to] >= start[from] + weight`, inserting a disjunctive edge or
    /// raising the weight of the edge already present.
    pub fn constrain(&mut self, from: OpId, to: OpId, weight: i32) -> EdgeUndo {
        let existing = self.edge(from, to).map(|e| e.weight);
        let previous_weight = match existing {
            Some(old) => {
                if weight > old {
                    trace!("tighten {} -> {} from {} to {}", from, to, old, weight);
                    assert!(self.set_edge_weight(from, to, weight).is_ok());
                }
                Some(old)
            }
            None => {
                trace!("add {} -> {} ({})", from, to, weight);
                assert!(self.add_edge(from, to, weight).is_ok());
                None
            }
        };
        EdgeUndo {
            from,
            to,
            previous_weight,
        }
    }

    pub fn undo(&mut self, undo: EdgeUndo) {
        let result = match undo.previous_weight {
            None => self.remove_edge(undo.from, undo.to).map(|_| ()),
            Some(w) => self.set_edge_weight(undo.from, undo.to, w).map(|_| ()),
        };
        trace!("undo {} -> {}", undo.from, undo.to);
        assert!(result.is_ok(), "undo of {:?} failed: {:?}", undo, result);
    }

    pub fn has_cycle(&self) -> bool {
        crate::scheduling::earliest_starts(self).is_err()
    }

    pub fn edge(&self, from: OpId, to: OpId) -> Option<&Edge> {
        self.succ[from].iter().find(|e| e.to == to)
    }

    pub fn successors(&self, op: OpId) -> &[Edge] {
        &self.succ[op]
    }

    pub fn in_degrees(&self) -> &TiSlice<OpId, u32> {
        &self.in_degree
    }

    pub fn node(&self, op: OpId) -> &OpNode {
        &self.nodes[op]
    }

    pub fn nodes(&self) -> &TiSlice<OpId, OpNode> {
        &self.nodes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    pub fn paths(&self) -> &[(TrainId, Vec<OpId>)] {
        &self.paths
    }

    pub fn resource_uses(&self) -> &ResourceUseIndex {
        &self.resource_uses
    }

    pub fn op_id(&self, train: TrainId, op_idx: usize) -> Option<OpId> {
        self.paths
            .iter()
            .find(|(t, _)| *t == train)
            .and_then(|(_, ids)| ids.iter().copied().find(|id| self.nodes[*id].op_idx == op_idx))
    }

    /// True for the first operation of a route.
    pub fn is_route_start(&self, op: OpId) -> bool {
        self.paths.iter().any(|(_, ids)| ids.first() == Some(&op))
    }

    pub fn edges(&self) -> impl Iterator<Item = (OpId, &Edge)> {
        self.succ
            .iter_enumerated()
            .flat_map(|(from, es)| es.iter().map(move |e| (from, e)))
    }

    /// All edges as sorted `(from, to, weight, kind)` tuples.
    pub fn edge_set(&self) -> Vec<(OpId, OpId, i32, EdgeKind)> {
        let mut set = self
            .edges()
            .map(|(from, e)| (from, e.to, e.weight, e.kind))
            .collect::<Vec<_>>();
        set.sort_by_key(|(from, to, _, _)| (*from, *to));
        set
    }

    pub fn disjunctive_edges(&self) -> Vec<(OpId, OpId, i32)> {
        self.edge_set()
            .into_iter()
            .filter(|(_, _, _, kind)| *kind == EdgeKind::Disjunctive)
            .map(|(from, to, w, _)| (from, to, w))
            .collect()
    }
}

/// A speculative edge that is taken back when the edit goes out of scope,
/// unless it was committed.
pub struct GraphEdit<'a> {
    graph: &'a mut PrecedenceGraph,
    undo: EdgeUndo,
    committed: bool,
}

impl<'a> GraphEdit<'a> {
    pub fn constrain(graph: &'a mut PrecedenceGraph, from: OpId, to: OpId, weight: i32) -> Self {
        let undo = graph.constrain(from, to, weight);
        GraphEdit {
            graph,
            undo,
            committed: false,
        }
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Deref for GraphEdit<'_> {
    type Target = PrecedenceGraph;
    fn deref(&self) -> &Self::Target {
        self.graph
    }
}

impl DerefMut for GraphEdit<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.graph
    }
}

impl Drop for GraphEdit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.graph.undo(self.undo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intervals::Release,
        problem::{Operation, ResourceId, Train},
    };

    fn two_trains() -> (Problem, Vec<Route>) {
        let mut problem = Problem::default();
        problem.trains.push(Train::chain(vec![
            Operation::new(5).uses(0usize, 0),
            Operation::new(3).uses(0usize, 2),
            Operation::new(1),
        ]));
        problem.trains.push(Train::chain(vec![
            Operation::new(4).uses(0usize, 0),
            Operation::new(2).uses(1usize, 0),
        ]));
        let routes = problem.default_routes().unwrap();
        (problem, routes)
    }

    #[test]
    fn builds_path_edges_and_holds() {
        let (problem, routes) = two_trains();
        let g = PrecedenceGraph::from_routes(&problem, &routes).unwrap();

        assert_eq!(g.n_nodes(), 5);
        assert_eq!(g.n_edges(), 3);
        assert_eq!(g.edge(OpId(0), OpId(1)).map(|e| e.weight), Some(5));
        assert_eq!(g.edge(OpId(1), OpId(2)).map(|e| e.weight), Some(3));
        assert_eq!(g.edge(OpId(3), OpId(4)).map(|e| e.weight), Some(4));
        assert!(g.edge(OpId(2), OpId(3)).is_none());
        assert_eq!(g.in_degrees()[OpId(0)], 0);
        assert_eq!(g.in_degrees()[OpId(1)], 1);

        let r0 = g.resource_uses().intervals_for(ResourceId(0));
        assert_eq!(r0.len(), 2);
        // ops 0 and 1 of the first train form one hold, released 2 after op 2 starts.
        assert_eq!(r0[0].lock, OpId(0));
        assert_eq!(
            r0[0].release,
            Release::At {
                unlock: OpId(2),
                release_time: 2
            }
        );
        assert_eq!(r0[1].lock, OpId(3));
        assert_eq!(r0[1].unlock(), Some(OpId(4)));

        let r1 = g.resource_uses().intervals_for(ResourceId(1));
        assert_eq!(r1[0].release, Release::Never);

        assert_eq!(g.op_id(TrainId(1), 1), Some(OpId(4)));
        assert!(g.is_route_start(OpId(3)));
        assert!(!g.is_route_start(OpId(4)));
        assert!(!g.has_cycle());
    }

    #[test]
    fn edge_misuse_is_reported() {
        let (problem, routes) = two_trains();
        let mut g = PrecedenceGraph::from_routes(&problem, &routes).unwrap();

        assert!(g.add_edge(OpId(2), OpId(3), 0).is_ok());
        assert_eq!(
            g.add_edge(OpId(2), OpId(3), 1),
            Err(GraphError::DuplicateEdge {
                from: OpId(2),
                to: OpId(3)
            })
        );
        assert!(g.remove_edge(OpId(2), OpId(3)).is_ok());
        assert_eq!(
            g.remove_edge(OpId(2), OpId(3)),
            Err(GraphError::EdgeNotFound {
                from: OpId(2),
                to: OpId(3)
            })
        );
        assert_eq!(
            g.add_path(&problem, &routes[0]),
            Err(GraphError::DuplicateTrain(TrainId(0)))
        );
    }

    #[test]
    fn detects_cycles() {
        let (problem, routes) = two_trains();
        let mut g = PrecedenceGraph::from_routes(&problem, &routes).unwrap();
        g.add_edge(OpId(1), OpId(3), 0).unwrap();
        assert!(!g.has_cycle());
        g.add_edge(OpId(4), OpId(0), 0).unwrap();
        assert!(g.has_cycle());
        g.remove_edge(OpId(4), OpId(0)).unwrap();
        assert!(!g.has_cycle());
    }

    #[test]
    fn edits_revert_unless_committed() {
        let (problem, routes) = two_trains();
        let mut g = PrecedenceGraph::from_routes(&problem, &routes).unwrap();
        let before = g.edge_set();

        {
            let mut edit = GraphEdit::constrain(&mut g, OpId(2), OpId(3), 2);
            assert_eq!(edit.n_edges(), 4);
            let inner = GraphEdit::constrain(&mut edit, OpId(2), OpId(3), 7);
            assert_eq!(inner.edge(OpId(2), OpId(3)).map(|e| e.weight), Some(7));
        }
        assert_eq!(g.edge_set(), before);

        GraphEdit::constrain(&mut g, OpId(4), OpId(0), 1).commit();
        assert_eq!(g.disjunctive_edges(), vec![(OpId(4), OpId(0), 1)]);
    }

    #[test]
    fn rejects_unknown_operations() {
        let (problem, _) = two_trains();
        let mut g = PrecedenceGraph::new();
        let route = Route {
            train: TrainId(0),
            ops: vec![0, 9],
        };
        assert_eq!(
            g.add_path(&problem, &route),
            Err(GraphError::UnknownOperation {
                train: TrainId(0),
                op: 9
            })
        );
        assert_eq!(g.n_nodes(), 0);
    }
}
