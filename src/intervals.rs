use typed_index_collections::{TiSlice, TiVec};

use crate::{
    graph::OpId,
    problem::{ResourceId, TrainId},
};

/// When a train gives a resource back.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Release {
    /// Free again `release_time` after `unlock` starts.
    At { unlock: OpId, release_time: i32 },
    /// Held until the end of the route and beyond.
    Never,
}

/// One train's contiguous hold of one resource.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ResourceUse {
    pub train: TrainId,
    pub lock: OpId,
    pub release: Release,
}

impl ResourceUse {
    pub fn unlock(&self) -> Option<OpId> {
        match self.release {
            Release::At { unlock, .. } => Some(unlock),
            Release::Never => None,
        }
    }

    pub fn release_time(&self) -> i32 {
        match self.release {
            Release::At { release_time, .. } => release_time,
            Release::Never => 0,
        }
    }

    pub fn occupation(&self, start: &TiSlice<OpId, i32>) -> Occupation {
        Occupation {
            start: start[self.lock],
            end: match self.release {
                Release::At {
                    unlock,
                    release_time,
                } => OccupationEnd::At(start[unlock].saturating_add(release_time)),
                Release::Never => OccupationEnd::Open,
            },
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OccupationEnd {
    At(i32),
    Open,
}

/// The half-open time window `[start, end)` a resource use occupies.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Occupation {
    pub start: i32,
    pub end: OccupationEnd,
}

/// Length of the common part of two occupations. `Unbounded` sorts above every finite overlap.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Overlap {
    Finite(i32),
    Unbounded,
}

impl Occupation {
    pub fn overlap(&self, other: &Self) -> Option<Overlap> {
        let start = self.start.max(other.start);
        let end = match (self.end, other.end) {
            (OccupationEnd::Open, OccupationEnd::Open) => return Some(Overlap::Unbounded),
            (OccupationEnd::At(e), OccupationEnd::Open)
            | (OccupationEnd::Open, OccupationEnd::At(e)) => e,
            (OccupationEnd::At(e1), OccupationEnd::At(e2)) => e1.min(e2),
        };
        (end > start).then(|| Overlap::Finite(end.saturating_sub(start)))
    }
}

/// Per resource, the holds contributed by every train's path.
#[derive(Clone, Debug, Default)]
pub struct ResourceUseIndex {
    uses: TiVec<ResourceId, Vec<ResourceUse>>,
}

impl ResourceUseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `op` of `train` needs `resource`. If the same train's previous hold of
    /// this resource ends exactly at `op`, the hold is extended instead of starting a new one.
    pub fn add(
        &mut self,
        resource: ResourceId,
        train: TrainId,
        op: OpId,
        next: Option<OpId>,
        release_time: i32,
    ) {
        while self.uses.len() <= usize::from(resource) {
            self.uses.push(Vec::new());
        }

        let release = match next {
            Some(unlock) => Release::At {
                unlock,
                release_time,
            },
            None => Release::Never,
        };

        let uses = &mut self.uses[resource];
        if let Some(last) = uses.last_mut() {
            if last.train == train && last.unlock() == Some(op) {
                last.release = release;
                return;
            }
            // The same operation listing the resource again.
            if last.train == train {
                match (&mut last.release, release) {
                    (
                        Release::At {
                            unlock,
                            release_time: held,
                        },
                        Release::At {
                            unlock: next_unlock,
                            release_time,
                        },
                    ) if *unlock == next_unlock => {
                        *held = (*held).max(release_time);
                        return;
                    }
                    (Release::Never, Release::Never) => return,
                    _ => {}
                }
            }
        }

        uses.push(ResourceUse {
            train,
            lock: op,
            release,
        });
    }

    pub fn intervals_for(&self, resource: ResourceId) -> &[ResourceUse] {
        self.uses.get(resource).map_or(&[][..], |v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &[ResourceUse])> {
        self.uses
            .iter_enumerated()
            .map(|(r, uses)| (r, uses.as_slice()))
    }

    pub fn n_resources(&self) -> usize {
        self.uses.len()
    }

    pub fn n_uses(&self) -> usize {
        self.uses.iter().map(|u| u.len()).sum()
    }
}
