use log::debug;

use super::{BudgetClock, SearchConfig, SolveStats, SolverError};
use crate::{
    conflicts::{find_conflict, separating_edge},
    debug::SolverAction,
    graph::{GraphEdit, PrecedenceGraph},
    scheduling::{earliest_starts, Schedule},
};

struct Search<'a, F> {
    config: &'a SearchConfig,
    clock: BudgetClock,
    stats: &'a mut SolveStats,
    debug_out: &'a mut F,
}

/// Depth-first search over the two orderings of the worst conflict at each level.
/// Every edge tried is undone again unless the subtree below it succeeds, so on
/// failure the graph has exactly the edges it started with.
pub fn solve<F: FnMut(SolverAction)>(
    graph: &mut PrecedenceGraph,
    config: &SearchConfig,
    stats: &mut SolveStats,
    debug_out: &mut F,
) -> Result<Schedule, SolverError> {
    let _p = hprof::enter("backtrack solver");
    let mut search = Search {
        config,
        clock: BudgetClock::start(config.budget),
        stats,
        debug_out,
    };
    search.resolve(graph, 0)
}

impl<F: FnMut(SolverAction)> Search<'_, F> {
    fn resolve(&mut self, graph: &mut PrecedenceGraph, depth: usize) -> Result<Schedule, SolverError> {
        self.stats.nodes += 1;
        self.stats.max_depth = self.stats.max_depth.max(depth);
        if self.clock.exhausted(self.stats.nodes) {
            debug!("{}budget exhausted", "  ".repeat(depth));
            return Err(SolverError::Timeout);
        }

        let schedule = match earliest_starts(graph) {
            Ok(schedule) => schedule,
            Err(cycle) => {
                debug!("{}cycle", "  ".repeat(depth));
                self.stats.cycles += 1;
                (self.debug_out)(SolverAction::Cycle {
                    depth,
                    unscheduled: cycle.unscheduled.len(),
                });
                return Err(SolverError::Infeasible);
            }
        };

        if self.config.respect_upper_bounds {
            if let Some(op) = schedule.upper_bound_violation(graph) {
                debug!("{}{} starts too late", "  ".repeat(depth), op);
                (self.debug_out)(SolverAction::UpperBoundExceeded { depth, op });
                return Err(SolverError::Infeasible);
            }
        }

        let conflict = match find_conflict(graph, &schedule) {
            Some(conflict) => conflict,
            None => {
                (self.debug_out)(SolverAction::Feasible { depth });
                return Ok(schedule);
            }
        };

        self.stats.branch_points += 1;
        (self.debug_out)(SolverAction::Branch { depth, conflict });

        for (before, after) in conflict.orderings() {
            self.stats.alternatives += 1;

            let (from, to, weight) = match separating_edge(&before, &after) {
                Some(edge) => edge,
                None => {
                    debug!(
                        "{}{} never releases {}",
                        "  ".repeat(depth),
                        before.train,
                        conflict.resource
                    );
                    (self.debug_out)(SolverAction::OrderingUnavailable {
                        depth,
                        resource: conflict.resource,
                        train: before.train,
                    });
                    continue;
                }
            };

            debug!("{}{} -> {}", "  ".repeat(depth), from, to);
            (self.debug_out)(SolverAction::TryOrdering {
                depth,
                from,
                to,
                weight,
            });

            let mut edit = GraphEdit::constrain(graph, from, to, weight);
            match self.resolve(&mut edit, depth + 1) {
                Ok(schedule) => {
                    edit.commit();
                    return Ok(schedule);
                }
                Err(SolverError::Infeasible) => {
                    self.stats.backtracks += 1;
                    (self.debug_out)(SolverAction::Backtrack { depth, from, to });
                }
                Err(SolverError::Timeout) => return Err(SolverError::Timeout),
            }
        }

        Err(SolverError::Infeasible)
    }
}
