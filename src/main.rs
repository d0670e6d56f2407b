use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Instant,
};

use dispatchgraph::{
    graph::PrecedenceGraph,
    parser::read_json_file,
    solvers::{solve_debug, SearchBudget, SearchConfig, SolveStats, SolverError, Strategy},
};
use log::{error, info, trace, LevelFilter};
use serde::Serialize;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "dispatchgraph")]
struct Opt {
    /// Log search decisions (overridden by RUST_LOG)
    #[structopt(short, long)]
    verbose: bool,

    /// backtrack or greedy
    #[structopt(long, default_value = "backtrack")]
    strategy: Strategy,

    /// Give up after expanding this many search nodes
    #[structopt(long)]
    max_nodes: Option<usize>,

    /// Give up after this many seconds
    #[structopt(long)]
    timeout: Option<f64>,

    /// Reject schedules where an operation starts after its start_ub
    #[structopt(long)]
    respect_upper_bounds: bool,

    /// Print hprof timings after each instance
    #[structopt(long)]
    profile: bool,

    /// Write schedules and statistics as JSON
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Instance files to process
    #[structopt(name = "FILE", parse(from_os_str), required = true)]
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct StartTime {
    train: usize,
    operation: usize,
    start: i32,
}

#[derive(Serialize)]
struct InstanceOutput {
    instance: String,
    status: &'static str,
    stats: SolveStats,
    starts: Vec<StartTime>,
}

pub fn main() {
    let opt = Opt::from_args();

    if opt.verbose {
        let mut builder = pretty_env_logger::formatted_builder();
        builder.filter_level(LevelFilter::Debug);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        builder.init();
    } else {
        pretty_env_logger::init();
    }

    let config = SearchConfig {
        strategy: opt.strategy,
        budget: SearchBudget {
            max_nodes: opt.max_nodes,
            timeout: opt.timeout,
        },
        respect_upper_bounds: opt.respect_upper_bounds,
    };
    info!("{:?}", config);

    let mut outputs = Vec::new();
    for file in opt.files.iter() {
        hprof::start_frame();
        let (output, solve_time) = solve_file(file, &config);
        println!(
            "{}  {}  {}  {}  {:.0}",
            output.instance,
            output.status,
            output.stats.nodes,
            output.stats.backtracks,
            solve_time * 1000.0,
        );
        if opt.profile {
            hprof::profiler().print_timing();
        }
        outputs.push(output);
    }

    if let Some(path) = opt.output.as_ref() {
        if let Err(e) = write_output(path, &outputs) {
            error!("Could not write {}: {}", path.to_string_lossy(), e);
            std::process::exit(1);
        }
    }
}

/// Solve one instance, returning its output record and the solve time in seconds.
fn solve_file(file: &Path, config: &SearchConfig) -> (InstanceOutput, f64) {
    let instance = file.to_string_lossy().to_string();
    let failed = |status: &'static str| {
        (
            InstanceOutput {
                instance: instance.clone(),
                status,
                stats: SolveStats::default(),
                starts: Vec::new(),
            },
            0.0,
        )
    };

    let named = match read_json_file(file) {
        Ok(named) => named,
        Err(e) => {
            error!("{}: {}", instance, e);
            return failed("parse_error");
        }
    };
    let routes = match named.problem.default_routes() {
        Ok(routes) => routes,
        Err(e) => {
            error!("{}: {}", instance, e);
            return failed("route_error");
        }
    };
    let mut graph = match PrecedenceGraph::from_routes(&named.problem, &routes) {
        Ok(graph) => graph,
        Err(e) => {
            error!("{}: {}", instance, e);
            return failed("route_error");
        }
    };
    info!(
        "{}: {} operations, {} resource uses on {} resources",
        instance,
        graph.n_nodes(),
        graph.resource_uses().n_uses(),
        named.problem.n_resources()
    );

    let start_time = Instant::now();
    let (result, stats) = solve_debug(&mut graph, config, |action| trace!("{:?}", action));
    let solve_time = start_time.elapsed().as_secs_f64();

    let (status, starts) = match result {
        Ok(solution) => {
            let status = match solution.schedule.verify(&graph, config.respect_upper_bounds) {
                Ok(()) => "feasible",
                Err(violation) => {
                    error!("{}: solution does not verify: {}", instance, violation);
                    "invalid"
                }
            };
            info!(
                "{}: {} ordering edges, makespan {}",
                instance,
                solution.added_edges.len(),
                solution.schedule.makespan(&graph)
            );
            let starts = solution
                .schedule
                .train_starts(&graph)
                .into_iter()
                .flat_map(|(train, times)| {
                    times.into_iter().map(move |(operation, start)| StartTime {
                        train: train.into(),
                        operation,
                        start,
                    })
                })
                .collect();
            (status, starts)
        }
        Err(SolverError::Infeasible) => ("infeasible", Vec::new()),
        Err(SolverError::Timeout) => ("timeout", Vec::new()),
    };

    (
        InstanceOutput {
            instance,
            status,
            stats,
            starts,
        },
        solve_time,
    )
}

fn write_output(path: &Path, outputs: &[InstanceOutput]) -> std::io::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, outputs)?;
    Ok(())
}
