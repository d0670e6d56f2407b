use crate::{
    conflicts::Conflict,
    graph::OpId,
    problem::{ResourceId, TrainId},
};

/// Search events, reported through the callback of [`crate::solvers::solve_debug`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolverAction {
    Branch {
        depth: usize,
        conflict: Conflict,
    },
    TryOrdering {
        depth: usize,
        from: OpId,
        to: OpId,
        weight: i32,
    },
    /// The hold that would have to go first is never released.
    OrderingUnavailable {
        depth: usize,
        resource: ResourceId,
        train: TrainId,
    },
    Cycle {
        depth: usize,
        unscheduled: usize,
    },
    UpperBoundExceeded {
        depth: usize,
        op: OpId,
    },
    Backtrack {
        depth: usize,
        from: OpId,
        to: OpId,
    },
    Feasible {
        depth: usize,
    },
    EdgeAccepted {
        from: OpId,
        to: OpId,
        weight: i32,
    },
    EdgeSkipped {
        from: OpId,
        to: OpId,
    },
}
