use log::{debug, trace, warn};
use typed_index_collections::TiVec;

use super::{BudgetClock, SearchConfig, SolveStats, SolverError};
use crate::{
    conflicts::{find_conflict, separating_edge},
    debug::SolverAction,
    graph::{EdgeUndo, PrecedenceGraph},
    intervals::{Release, ResourceUse},
    problem::ResourceId,
    scheduling::{earliest_starts, Schedule},
};

/// Place the resource uses one at a time in priority order, each behind the use placed
/// before it on the same resource. An edge that would close a cycle is skipped and the
/// use retried after the next placement. Never reconsiders a placement, so it can fail
/// on instances the backtracking search solves.
pub fn solve<F: FnMut(SolverAction)>(
    graph: &mut PrecedenceGraph,
    config: &SearchConfig,
    stats: &mut SolveStats,
    debug_out: &mut F,
) -> Result<Schedule, SolverError> {
    let _p = hprof::enter("greedy solver");
    let clock = BudgetClock::start(config.budget);

    let initial = match earliest_starts(graph) {
        Ok(schedule) => schedule,
        Err(cycle) => {
            stats.cycles += 1;
            debug_out(SolverAction::Cycle {
                depth: 0,
                unscheduled: cycle.unscheduled.len(),
            });
            return Err(SolverError::Infeasible);
        }
    };

    let mut pending = prioritized_uses(graph, &initial);
    debug!("greedy: placing {} resource uses", pending.len());

    let mut last_placed: TiVec<ResourceId, Option<ResourceUse>> =
        vec![None; graph.resource_uses().n_resources()].into();
    let mut trail: Vec<EdgeUndo> = Vec::new();

    let result = loop {
        if pending.is_empty() {
            break Ok(());
        }
        stats.nodes += 1;
        if clock.exhausted(stats.nodes) {
            break Err(SolverError::Timeout);
        }
        if !place_next(graph, &mut pending, &mut last_placed, &mut trail, stats, debug_out) {
            debug!("greedy: {} uses could not be placed", pending.len());
            break Err(SolverError::Infeasible);
        }
    };

    let result = result.and_then(|()| {
        let schedule = earliest_starts(graph).map_err(|_| SolverError::Infeasible)?;
        if config.respect_upper_bounds {
            if let Some(op) = schedule.upper_bound_violation(graph) {
                debug!("greedy: {} starts too late", op);
                debug_out(SolverAction::UpperBoundExceeded { depth: 0, op });
                return Err(SolverError::Infeasible);
            }
        }
        if let Some(c) = find_conflict(graph, &schedule) {
            warn!("greedy: conflict left on {} after placing every use", c.resource);
            return Err(SolverError::Infeasible);
        }
        Ok(schedule)
    });

    match result {
        Ok(schedule) => {
            debug_out(SolverAction::Feasible { depth: 0 });
            Ok(schedule)
        }
        Err(e) => {
            for undo in trail.into_iter().rev() {
                graph.undo(undo);
            }
            Err(e)
        }
    }
}

/// Uses starting a route come first and uses that are never released come last. The
/// rest are ordered by the midpoint of their hold in the path-only schedule.
fn prioritized_uses(graph: &PrecedenceGraph, schedule: &Schedule) -> Vec<(ResourceId, ResourceUse)> {
    let mut uses = graph
        .resource_uses()
        .iter()
        .flat_map(|(r, uses)| uses.iter().map(move |u| (r, *u)))
        .collect::<Vec<_>>();

    uses.sort_by_key(|(r, u)| {
        let (class, key) = if graph.is_route_start(u.lock) {
            (0, 0)
        } else {
            match u.release {
                Release::At { unlock, .. } => (1, schedule.start(u.lock) + schedule.start(unlock)),
                Release::Never => (2, 0),
            }
        };
        (class, key, *r, u.train, u.lock)
    });
    uses
}

/// Scan the pending uses and place the first one that fits. Returns false if none did.
fn place_next<F: FnMut(SolverAction)>(
    graph: &mut PrecedenceGraph,
    pending: &mut Vec<(ResourceId, ResourceUse)>,
    last_placed: &mut TiVec<ResourceId, Option<ResourceUse>>,
    trail: &mut Vec<EdgeUndo>,
    stats: &mut SolveStats,
    debug_out: &mut F,
) -> bool {
    for idx in 0..pending.len() {
        let (resource, current) = pending[idx];

        if let Some(prev) = last_placed[resource] {
            let (from, to, weight) = match separating_edge(&prev, &current) {
                Some(edge) => edge,
                None => {
                    trace!("{} holds {} forever, {} has to wait", prev.train, resource, current.train);
                    continue;
                }
            };

            let undo = graph.constrain(from, to, weight);
            if graph.has_cycle() {
                graph.undo(undo);
                stats.edges_skipped += 1;
                trace!("skip {} -> {} on {}", from, to, resource);
                debug_out(SolverAction::EdgeSkipped { from, to });
                continue;
            }

            trail.push(undo);
            stats.edges_added += 1;
            debug_out(SolverAction::EdgeAccepted { from, to, weight });
        }

        trace!("placed {} on {}", current.train, resource);
        last_placed[resource] = Some(current);
        pending.remove(idx);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::OpId,
        problem::{Operation, Train},
        solvers::{solve, solve_debug, testing, SearchBudget, Strategy},
    };

    fn config() -> SearchConfig {
        SearchConfig {
            strategy: Strategy::Greedy,
            ..Default::default()
        }
    }

    #[test]
    fn two_trains_in_priority_order() {
        let mut g = testing::two_trains();
        let solution = solve(&mut g, &config()).unwrap();
        assert_eq!(solution.added_edges, vec![(OpId(1), OpId(2), 0)]);
        assert_eq!(solution.schedule.start(OpId(2)), 5);
        assert_eq!(solution.schedule.start(OpId(3)), 9);
        assert_eq!(solution.stats.edges_added, 1);
        assert_eq!(solution.stats.edges_skipped, 0);
    }

    #[test]
    fn repeated_resource_on_one_operation() {
        let trains = || {
            vec![Train::chain(vec![
                Operation::new(3).uses(0usize, 0).uses(0usize, 0),
                Operation::new(1),
            ])]
        };
        let g = testing::graph(trains());
        assert_eq!(g.resource_uses().intervals_for(ResourceId(0)).len(), 1);

        for strategy in [Strategy::Greedy, Strategy::Backtrack] {
            let mut g = testing::graph(trains());
            let config = SearchConfig {
                strategy,
                ..Default::default()
            };
            let solution = solve(&mut g, &config).unwrap();
            assert!(solution.added_edges.is_empty());
            assert_eq!(solution.schedule.start(OpId(1)), 3);
        }
    }

    #[test]
    fn open_ended_hold_goes_last() {
        let mut g = testing::graph(vec![
            Train::chain(vec![Operation::new(3).uses(0usize, 0), Operation::new(1)]),
            Train::chain(vec![Operation::new(2), Operation::new(1).uses(0usize, 0)]),
        ]);
        let solution = solve(&mut g, &config()).unwrap();
        assert_eq!(solution.added_edges, vec![(OpId(1), OpId(3), 0)]);
        assert_eq!(solution.schedule.start(OpId(3)), 3);
        assert!(solution.schedule.verify(&g, false).is_ok());
    }

    #[test]
    fn skipped_cycle_leaves_triangle_unresolved() {
        let mut g = testing::deadlock_triangle();
        let before = g.edge_set();
        let mut actions = Vec::new();
        let (result, stats) = solve_debug(&mut g, &config(), |a| actions.push(a));
        assert_eq!(result.unwrap_err(), SolverError::Infeasible);
        assert_eq!(stats.edges_added, 2);
        assert_eq!(stats.edges_skipped, 1);
        assert!(actions
            .iter()
            .any(|a| matches!(a, SolverAction::EdgeSkipped { .. })));
        assert_eq!(g.edge_set(), before);
    }

    #[test]
    fn incomplete_where_backtracking_succeeds() {
        let mut g = testing::crossing();
        let before = g.edge_set();
        let (result, stats) = solve_debug(&mut g, &config(), |_| {});
        assert_eq!(result.unwrap_err(), SolverError::Infeasible);
        assert!(stats.edges_skipped >= 2);
        assert_eq!(g.edge_set(), before);

        let solution = solve(&mut g, &SearchConfig::default()).unwrap();
        assert!(solution.schedule.verify(&g, false).is_ok());
    }

    #[test]
    fn budget_unwinds_placed_edges() {
        let mut g = testing::following();
        let before = g.edge_set();
        let config = SearchConfig {
            budget: SearchBudget::nodes(1),
            ..config()
        };
        assert_eq!(solve(&mut g, &config).unwrap_err(), SolverError::Timeout);
        assert_eq!(g.edge_set(), before);
    }

    #[test]
    fn following_trains_are_chained() {
        let mut g = testing::following();
        let solution = solve(&mut g, &config()).unwrap();
        let starts = solution.schedule.start.iter().copied().collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 3, 6, 4, 7, 11, 8, 12, 14]);
        assert_eq!(solution.stats.edges_added, 4);
    }

    #[test]
    fn upper_bounds_checked_after_placement() {
        let trains = || {
            vec![
                Train::chain(vec![Operation::new(5).uses(0usize, 0), Operation::new(3)]),
                Train::chain(vec![
                    Operation::new(4).start_ub(2).uses(0usize, 0),
                    Operation::new(2),
                ]),
            ]
        };
        let mut g = testing::graph(trains());
        let before = g.edge_set();
        let strict = SearchConfig {
            respect_upper_bounds: true,
            ..config()
        };
        assert_eq!(solve(&mut g, &strict).unwrap_err(), SolverError::Infeasible);
        assert_eq!(g.edge_set(), before);

        let solution = solve(&mut g, &config()).unwrap();
        assert_eq!(solution.schedule.upper_bound_violation(&g), Some(OpId(2)));
    }
}
