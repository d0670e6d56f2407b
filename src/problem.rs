use derive_more::Display;
use log::warn;
use typed_index_collections::TiVec;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display(fmt = "t{}", _0)]
pub struct TrainId(pub u32);

impl From<TrainId> for usize {
    fn from(v: TrainId) -> Self {
        v.0 as usize
    }
}

impl From<usize> for TrainId {
    fn from(x: usize) -> Self {
        TrainId(x as u32)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display(fmt = "r{}", _0)]
pub struct ResourceId(pub u32);

impl From<ResourceId> for usize {
    fn from(v: ResourceId) -> Self {
        v.0 as usize
    }
}

impl From<usize> for ResourceId {
    fn from(x: usize) -> Self {
        ResourceId(x as u32)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Problem {
    pub trains: TiVec<TrainId, Train>,
}

#[derive(Clone, Debug, Default)]
pub struct Train {
    pub operations: Vec<Operation>,
}

/// One activity of a train. `successors` lists the alternative continuations;
/// once a [`Route`] is fixed, exactly one of them is followed.
#[derive(Clone, Debug, Default)]
pub struct Operation {
    pub duration: i32,
    pub start_lb: i32,
    pub start_ub: Option<i32>,
    pub successors: Vec<usize>,
    pub resources: Vec<ResourceUsage>,
}

/// The operation needs `resource`, and keeps it for `release_time` after leaving it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ResourceUsage {
    pub resource: ResourceId,
    pub release_time: i32,
}

impl Operation {
    pub fn new(duration: i32) -> Self {
        Operation {
            duration,
            ..Default::default()
        }
    }

    pub fn start_lb(mut self, start_lb: i32) -> Self {
        self.start_lb = start_lb;
        self
    }

    pub fn start_ub(mut self, start_ub: i32) -> Self {
        self.start_ub = Some(start_ub);
        self
    }

    pub fn successors(mut self, successors: Vec<usize>) -> Self {
        self.successors = successors;
        self
    }

    pub fn uses(mut self, resource: impl Into<ResourceId>, release_time: i32) -> Self {
        let resource = resource.into();
        if self.resources.iter().any(|r| r.resource == resource) {
            warn!("Operation lists resource {} more than once", resource);
        }
        self.resources.push(ResourceUsage {
            resource,
            release_time,
        });
        self
    }
}

impl Train {
    /// A train whose operations run one after the other, with no alternatives.
    pub fn chain(operations: Vec<Operation>) -> Self {
        let n = operations.len();
        let operations = operations
            .into_iter()
            .enumerate()
            .map(|(idx, op)| {
                let successors = if idx + 1 < n { vec![idx + 1] } else { vec![] };
                op.successors(successors)
            })
            .collect();
        Train { operations }
    }
}

impl Problem {
    pub fn n_resources(&self) -> usize {
        self.trains
            .iter()
            .flat_map(|t| t.operations.iter())
            .flat_map(|op| op.resources.iter())
            .map(|r| usize::from(r.resource) + 1)
            .max()
            .unwrap_or(0)
    }

    /// One route per train, each following the first listed successor.
    pub fn default_routes(&self) -> Result<Vec<Route>, RouteError> {
        self.trains
            .iter_enumerated()
            .map(|(train_id, train)| Route::first_successors(train_id, train))
            .collect()
    }
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum RouteError {
    #[display(fmt = "route of {} is empty", _0)]
    Empty(TrainId),
    #[display(fmt = "route of {} does not start at operation 0", _0)]
    DoesNotStartAtSource(TrainId),
    #[display(fmt = "route of {}: operation {} is not a successor of {}", train, to, from)]
    NotASuccessor {
        train: TrainId,
        from: usize,
        to: usize,
    },
    #[display(fmt = "route of {} stops before reaching a final operation", _0)]
    DoesNotEnd(TrainId),
    #[display(fmt = "unknown train {}", _0)]
    UnknownTrain(TrainId),
}

/// A train's path through its operations, already routed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub train: TrainId,
    pub ops: Vec<usize>,
}

impl Route {
    pub fn new(problem: &Problem, train: TrainId, ops: Vec<usize>) -> Result<Self, RouteError> {
        let t = problem
            .trains
            .get(train)
            .ok_or(RouteError::UnknownTrain(train))?;

        match ops.first() {
            None => return Err(RouteError::Empty(train)),
            Some(0) => {}
            Some(_) => return Err(RouteError::DoesNotStartAtSource(train)),
        }

        for w in ops.windows(2) {
            let (from, to) = (w[0], w[1]);
            let ok = t
                .operations
                .get(from)
                .map_or(false, |op| op.successors.contains(&to));
            if !ok {
                return Err(RouteError::NotASuccessor { train, from, to });
            }
        }

        let last = ops[ops.len() - 1];
        if t.operations.get(last).map_or(true, |op| !op.successors.is_empty()) {
            return Err(RouteError::DoesNotEnd(train));
        }

        Ok(Route { train, ops })
    }

    pub fn first_successors(train_id: TrainId, train: &Train) -> Result<Self, RouteError> {
        if train.operations.is_empty() {
            return Err(RouteError::Empty(train_id));
        }

        let mut ops = vec![0];
        loop {
            let current = ops[ops.len() - 1];
            match train.operations[current].successors.first() {
                None => break,
                Some(&next) => {
                    if next >= train.operations.len() {
                        return Err(RouteError::NotASuccessor {
                            train: train_id,
                            from: current,
                            to: next,
                        });
                    }
                    // Successor lists that loop back never reach a final operation.
                    if ops.len() >= train.operations.len() {
                        return Err(RouteError::DoesNotEnd(train_id));
                    }
                    ops.push(next);
                }
            }
        }

        Ok(Route {
            train: train_id,
            ops,
        })
    }
}
