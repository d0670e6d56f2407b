pub mod backtrack;
pub mod greedy;

use std::{str::FromStr, time::Instant};

use derive_more::Display;
use log::info;
use serde::Serialize;

use crate::{
    debug::SolverAction,
    graph::{OpId, PrecedenceGraph},
    scheduling::Schedule,
};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SolverError {
    /// No resource-feasible serialization exists for the fixed routes.
    #[display(fmt = "infeasible")]
    Infeasible,
    /// The search budget ran out before the search space was exhausted.
    #[display(fmt = "timeout")]
    Timeout,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Strategy {
    /// Depth-first search over both orderings of every conflict.
    #[display(fmt = "backtrack")]
    Backtrack,
    /// One pass in priority order, skipping edges that close a cycle. Incomplete.
    #[display(fmt = "greedy")]
    Greedy,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Backtrack
    }
}

impl FromStr for Strategy {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backtrack" => Ok(Strategy::Backtrack),
            "greedy" => Ok(Strategy::Greedy),
            _ => Err("Could not parse strategy (expected \"backtrack\" or \"greedy\")."),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchBudget {
    pub max_nodes: Option<usize>,
    /// Wall clock limit in seconds.
    pub timeout: Option<f64>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn nodes(max_nodes: usize) -> Self {
        SearchBudget {
            max_nodes: Some(max_nodes),
            timeout: None,
        }
    }
}

struct BudgetClock {
    budget: SearchBudget,
    start_time: Instant,
}

impl BudgetClock {
    fn start(budget: SearchBudget) -> Self {
        BudgetClock {
            budget,
            start_time: Instant::now(),
        }
    }

    fn exhausted(&self, nodes: usize) -> bool {
        self.budget.max_nodes.map_or(false, |max| nodes > max)
            || self
                .budget
                .timeout
                .map_or(false, |t| self.start_time.elapsed().as_secs_f64() > t)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchConfig {
    pub strategy: Strategy,
    pub budget: SearchBudget,
    /// Treat a schedule where some operation starts after its `start_ub` as a dead end.
    pub respect_upper_bounds: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SolveStats {
    pub nodes: usize,
    pub branch_points: usize,
    pub alternatives: usize,
    pub backtracks: usize,
    pub cycles: usize,
    pub max_depth: usize,
    pub edges_added: usize,
    pub edges_skipped: usize,
}

#[derive(Clone, Debug)]
pub struct Solution {
    pub schedule: Schedule,
    /// The disjunctive edges left in the graph.
    pub added_edges: Vec<(OpId, OpId, i32)>,
    pub stats: SolveStats,
}

pub fn solve(graph: &mut PrecedenceGraph, config: &SearchConfig) -> Result<Solution, SolverError> {
    solve_debug(graph, config, |_| {}).0
}

/// Resolve all resource conflicts of `graph` with the configured strategy. On success the
/// chosen edges stay in the graph; on failure the graph is left as it was.
pub fn solve_debug(
    graph: &mut PrecedenceGraph,
    config: &SearchConfig,
    mut debug_out: impl FnMut(SolverAction),
) -> (Result<Solution, SolverError>, SolveStats) {
    let mut stats = SolveStats::default();
    let result = match config.strategy {
        Strategy::Backtrack => backtrack::solve(graph, config, &mut stats, &mut debug_out),
        Strategy::Greedy => greedy::solve(graph, config, &mut stats, &mut debug_out),
    };

    match &result {
        Ok(_) => info!(
            "{} strategy found a schedule ({} nodes, {} backtracks)",
            config.strategy, stats.nodes, stats.backtracks
        ),
        Err(e) => info!(
            "{} strategy failed: {} ({} nodes, {} backtracks)",
            config.strategy, e, stats.nodes, stats.backtracks
        ),
    }

    let result = result.map(|schedule| Solution {
        schedule,
        added_edges: graph.disjunctive_edges(),
        stats: stats.clone(),
    });
    (result, stats)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        graph::PrecedenceGraph,
        problem::{Operation, Problem, Train},
    };

    pub fn graph(trains: Vec<Train>) -> PrecedenceGraph {
        let mut problem = Problem::default();
        for t in trains {
            problem.trains.push(t);
        }
        let routes = problem.default_routes().unwrap();
        PrecedenceGraph::from_routes(&problem, &routes).unwrap()
    }

    /// A uses R for 5 then runs 3, B uses R for 4 then runs 2.
    pub fn two_trains() -> PrecedenceGraph {
        graph(vec![
            Train::chain(vec![Operation::new(5).uses(0usize, 0), Operation::new(3)]),
            Train::chain(vec![Operation::new(4).uses(0usize, 0), Operation::new(2)]),
        ])
    }

    /// Each train moves from one resource into the next and stays there, around a triangle.
    pub fn deadlock_triangle() -> PrecedenceGraph {
        graph(vec![
            Train::chain(vec![
                Operation::new(5).uses(1usize, 1),
                Operation::new(5).uses(2usize, 1),
            ]),
            Train::chain(vec![
                Operation::new(5).uses(2usize, 1),
                Operation::new(5).uses(3usize, 1),
            ]),
            Train::chain(vec![
                Operation::new(5).uses(3usize, 1),
                Operation::new(5).uses(1usize, 1),
            ]),
        ])
    }

    /// Three trains following each other over two sections.
    pub fn following() -> PrecedenceGraph {
        graph(vec![
            Train::chain(vec![
                Operation::new(3).uses(0usize, 1),
                Operation::new(3).uses(1usize, 1),
                Operation::new(0),
            ]),
            Train::chain(vec![
                Operation::new(2).start_lb(1).uses(0usize, 1),
                Operation::new(4).uses(1usize, 1),
                Operation::new(0),
            ]),
            Train::chain(vec![
                Operation::new(4).start_lb(2).uses(0usize, 1),
                Operation::new(2).uses(1usize, 1),
                Operation::new(0),
            ]),
        ])
    }

    /// Four trains crossing the same two sections in opposite directions.
    pub fn crossing() -> PrecedenceGraph {
        graph(vec![
            Train::chain(vec![
                Operation::new(4).uses(0usize, 1),
                Operation::new(4).uses(1usize, 1),
                Operation::new(0),
            ]),
            Train::chain(vec![
                Operation::new(3).uses(1usize, 1),
                Operation::new(3).uses(0usize, 1),
                Operation::new(0),
            ]),
            Train::chain(vec![
                Operation::new(2).start_lb(1).uses(0usize, 0),
                Operation::new(6).uses(1usize, 0),
                Operation::new(0),
            ]),
            Train::chain(vec![
                Operation::new(5).start_lb(2).uses(1usize, 2),
                Operation::new(1).uses(0usize, 2),
                Operation::new(0),
            ]),
        ])
    }
}
