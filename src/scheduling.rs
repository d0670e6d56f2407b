use std::{cmp::Reverse, collections::BinaryHeap};

use derive_more::Display;
use typed_index_collections::{TiSlice, TiVec};

use crate::{
    graph::{OpId, PrecedenceGraph},
    problem::{ResourceId, TrainId},
};

/// Earliest start times under the current edge set, and the topological order they
/// were computed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub order: Vec<OpId>,
    pub start: TiVec<OpId, i32>,
}

#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display(fmt = "cycle among {} unscheduled operations", "unscheduled.len()")]
pub struct CycleDetected {
    pub unscheduled: Vec<OpId>,
}

/// Forward (ASAP) propagation over the precedence graph.
///
/// Ready operations are finalized in ascending order of their start time, so the
/// order is deterministic. If some operations never become ready they lie on or
/// behind a cycle, and no schedule exists.
pub fn earliest_starts(graph: &PrecedenceGraph) -> Result<Schedule, CycleDetected> {
    let _p = hprof::enter("earliest starts");
    let mut in_degree = graph.in_degrees().iter().copied().collect::<TiVec<OpId, u32>>();
    let mut start = graph
        .nodes()
        .iter()
        .map(|n| n.start_lb)
        .collect::<TiVec<OpId, i32>>();

    let mut ready = BinaryHeap::new();
    for (op, d) in in_degree.iter_enumerated() {
        if *d == 0 {
            ready.push(Reverse((start[op], op)));
        }
    }

    let mut order = Vec::with_capacity(graph.n_nodes());
    while let Some(Reverse((t, op))) = ready.pop() {
        order.push(op);
        for edge in graph.successors(op) {
            let next_t = t.saturating_add(edge.weight);
            if start[edge.to] < next_t {
                start[edge.to] = next_t;
            }
            in_degree[edge.to] -= 1;
            if in_degree[edge.to] == 0 {
                ready.push(Reverse((start[edge.to], edge.to)));
            }
        }
    }

    if order.len() < graph.n_nodes() {
        let unscheduled = in_degree
            .iter_enumerated()
            .filter(|(_, d)| **d > 0)
            .map(|(op, _)| op)
            .collect();
        return Err(CycleDetected { unscheduled });
    }

    Ok(Schedule { order, start })
}

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Violation {
    #[display(fmt = "{} starts before its earliest allowed start", _0)]
    BelowLowerBound(OpId),
    #[display(fmt = "{} starts after its latest allowed start", _0)]
    AboveUpperBound(OpId),
    #[display(fmt = "edge {} -> {} (+{}) is violated", from, to, weight)]
    EdgeViolated { from: OpId, to: OpId, weight: i32 },
    #[display(fmt = "trains {} and {} overlap on {}", first, second, resource)]
    ResourceOverlap {
        resource: ResourceId,
        first: TrainId,
        second: TrainId,
    },
    #[display(fmt = "schedule does not cover the graph")]
    WrongShape,
}

impl Schedule {
    pub fn start(&self, op: OpId) -> i32 {
        self.start[op]
    }

    pub fn starts(&self) -> &TiSlice<OpId, i32> {
        &self.start
    }

    /// First operation whose start exceeds its `start_ub`, if any.
    pub fn upper_bound_violation(&self, graph: &PrecedenceGraph) -> Option<OpId> {
        graph
            .nodes()
            .iter_enumerated()
            .find(|(op, n)| n.start_ub.map_or(false, |ub| self.start[*op] > ub))
            .map(|(op, _)| op)
    }

    /// Latest completion time over all operations.
    pub fn makespan(&self, graph: &PrecedenceGraph) -> i32 {
        graph
            .nodes()
            .iter_enumerated()
            .map(|(op, n)| self.start[op].saturating_add(n.duration))
            .max()
            .unwrap_or(0)
    }

    /// Start times grouped per train, as `(operation index, start)` along each path.
    pub fn train_starts(&self, graph: &PrecedenceGraph) -> Vec<(TrainId, Vec<(usize, i32)>)> {
        graph
            .paths()
            .iter()
            .map(|(train, ids)| {
                let times = ids
                    .iter()
                    .map(|id| (graph.node(*id).op_idx, self.start[*id]))
                    .collect();
                (*train, times)
            })
            .collect()
    }

    /// Check bounds, every edge of the graph, and pairwise resource exclusivity.
    pub fn verify(&self, graph: &PrecedenceGraph, check_upper_bounds: bool) -> Result<(), Violation> {
        let _p = hprof::enter("verify schedule");
        if self.start.len() != graph.n_nodes() {
            return Err(Violation::WrongShape);
        }

        for (op, node) in graph.nodes().iter_enumerated() {
            if self.start[op] < node.start_lb {
                return Err(Violation::BelowLowerBound(op));
            }
        }

        for (from, edge) in graph.edges() {
            if self.start[edge.to] < self.start[from].saturating_add(edge.weight) {
                return Err(Violation::EdgeViolated {
                    from,
                    to: edge.to,
                    weight: edge.weight,
                });
            }
        }

        for (resource, uses) in graph.resource_uses().iter() {
            for (i, a) in uses.iter().enumerate() {
                for b in uses[i + 1..].iter() {
                    if a.train == b.train {
                        continue;
                    }
                    let occ_a = a.occupation(&self.start);
                    let occ_b = b.occupation(&self.start);
                    if occ_a.overlap(&occ_b).is_some() {
                        return Err(Violation::ResourceOverlap {
                            resource,
                            first: a.train,
                            second: b.train,
                        });
                    }
                }
            }
        }

        if check_upper_bounds {
            if let Some(op) = self.upper_bound_violation(graph) {
                return Err(Violation::AboveUpperBound(op));
            }
        }

        Ok(())
    }
}
