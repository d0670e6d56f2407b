use std::{collections::HashMap, path::Path};

use derive_more::{Display, From};
use log::debug;
use serde::Deserialize;

use crate::problem::{Operation, Problem, ResourceId, ResourceUsage, Train, TrainId};

/// A problem together with the names its resources had in the instance file.
#[derive(Clone, Debug)]
pub struct NamedProblem {
    pub problem: Problem,
    pub resource_names: Vec<String>,
}

#[derive(Debug, Display, From)]
pub enum ParseError {
    #[display(fmt = "could not read instance: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "invalid instance json: {}", _0)]
    Json(serde_json::Error),
    #[display(
        fmt = "operation {} of {} has successor {} which does not exist",
        op,
        train,
        successor
    )]
    #[from(ignore)]
    UnknownSuccessor {
        train: TrainId,
        op: usize,
        successor: usize,
    },
    #[display(fmt = "operation {} of {} has negative {} ({})", op, train, field, value)]
    #[from(ignore)]
    NegativeValue {
        train: TrainId,
        op: usize,
        field: &'static str,
        value: i32,
    },
}

#[derive(Deserialize)]
struct RawInstance {
    trains: Vec<Vec<RawOperation>>,
    /// Delay cost terms. Accepted, but not used for conflict resolution.
    #[serde(default)]
    #[allow(dead_code)]
    objective: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawOperation {
    min_duration: i32,
    #[serde(default)]
    start_lb: i32,
    #[serde(default)]
    start_ub: Option<i32>,
    #[serde(default)]
    successors: Vec<usize>,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Deserialize)]
struct RawResource {
    resource: String,
    #[serde(default)]
    release_time: i32,
}

pub fn read_json_file(path: impl AsRef<Path>) -> Result<NamedProblem, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_json(&contents)
}

pub fn parse_json(contents: &str) -> Result<NamedProblem, ParseError> {
    let raw: RawInstance = serde_json::from_str(contents)?;

    let mut resource_ids: HashMap<String, ResourceId> = HashMap::new();
    let mut resource_names = Vec::new();
    let mut problem = Problem::default();

    for (train_idx, raw_ops) in raw.trains.into_iter().enumerate() {
        let train_id = TrainId::from(train_idx);
        let n_ops = raw_ops.len();
        let mut operations = Vec::with_capacity(n_ops);

        for (op_idx, raw_op) in raw_ops.into_iter().enumerate() {
            if let Some(&successor) = raw_op.successors.iter().find(|&&s| s >= n_ops) {
                return Err(ParseError::UnknownSuccessor {
                    train: train_id,
                    op: op_idx,
                    successor,
                });
            }

            let negative = |field: &'static str, value: i32| ParseError::NegativeValue {
                train: train_id,
                op: op_idx,
                field,
                value,
            };
            if raw_op.min_duration < 0 {
                return Err(negative("min_duration", raw_op.min_duration));
            }
            if raw_op.start_lb < 0 {
                return Err(negative("start_lb", raw_op.start_lb));
            }
            if let Some(r) = raw_op.resources.iter().find(|r| r.release_time < 0) {
                return Err(negative("release_time", r.release_time));
            }

            let resources = raw_op
                .resources
                .into_iter()
                .map(|r| {
                    let next_id = ResourceId::from(resource_names.len());
                    let resource = *resource_ids.entry(r.resource).or_insert_with_key(|name| {
                        resource_names.push(name.clone());
                        next_id
                    });
                    ResourceUsage {
                        resource,
                        release_time: r.release_time,
                    }
                })
                .collect();

            operations.push(Operation {
                duration: raw_op.min_duration,
                start_lb: raw_op.start_lb,
                start_ub: raw_op.start_ub,
                successors: raw_op.successors,
                resources,
            });
        }

        problem.trains.push(Train { operations });
    }

    debug!(
        "Parsed instance with {} trains and {} resources",
        problem.trains.len(),
        resource_names.len()
    );

    Ok(NamedProblem {
        problem,
        resource_names,
    })
}
