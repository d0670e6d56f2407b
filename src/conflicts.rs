use log::trace;

use crate::{
    graph::{OpId, PrecedenceGraph},
    intervals::{Overlap, ResourceUse},
    problem::ResourceId,
    scheduling::Schedule,
};

/// Two trains' holds of the same resource that overlap in time. `first` is the hold
/// that is locked earlier (ties go to the lower train).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Conflict {
    pub resource: ResourceId,
    pub first: ResourceUse,
    pub second: ResourceUse,
    pub overlap: Overlap,
}

impl Conflict {
    /// The two ways of serializing the pair as `(before, after)`, the earlier-locking
    /// hold first.
    pub fn orderings(&self) -> [(ResourceUse, ResourceUse); 2] {
        [(self.first, self.second), (self.second, self.first)]
    }
}

/// The edge forcing `after` to lock only once `before` has released, weighted by the
/// release time of `before`. `None` if `before` never releases.
pub fn separating_edge(before: &ResourceUse, after: &ResourceUse) -> Option<(OpId, OpId, i32)> {
    before
        .unlock()
        .map(|unlock| (unlock, after.lock, before.release_time()))
}

fn visit_conflicts(
    graph: &PrecedenceGraph,
    schedule: &Schedule,
    mut f: impl FnMut(Conflict),
) {
    let start = schedule.starts();
    for (resource, uses) in graph.resource_uses().iter() {
        for (i, a) in uses.iter().enumerate() {
            for b in uses[i + 1..].iter() {
                // A train never blocks itself.
                if a.train == b.train {
                    continue;
                }

                let occ_a = a.occupation(start);
                let occ_b = b.occupation(start);
                if let Some(overlap) = occ_a.overlap(&occ_b) {
                    let a_first = (occ_a.start, a.train) <= (occ_b.start, b.train);
                    let (first, second) = if a_first { (*a, *b) } else { (*b, *a) };
                    f(Conflict {
                        resource,
                        first,
                        second,
                        overlap,
                    });
                }
            }
        }
    }
}

/// The conflict with the largest overlap over all resources, or `None` if the
/// schedule respects every resource. Ties keep the first one found.
pub fn find_conflict(graph: &PrecedenceGraph, schedule: &Schedule) -> Option<Conflict> {
    let _p = hprof::enter("find conflict");
    let mut best: Option<Conflict> = None;
    visit_conflicts(graph, schedule, |c| {
        if best.map_or(true, |b| c.overlap > b.overlap) {
            best = Some(c);
        }
    });
    if let Some(c) = best.as_ref() {
        trace!(
            "worst conflict on {}: {} vs {} ({:?})",
            c.resource,
            c.first.train,
            c.second.train,
            c.overlap
        );
    }
    best
}

pub fn all_conflicts(graph: &PrecedenceGraph, schedule: &Schedule) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    visit_conflicts(graph, schedule, |c| conflicts.push(c));
    conflicts
}
