//! Wait-for bookkeeping across resolution chains.
//!
//! A chain's own path catches cycles it walks into by itself. When two chains
//! start from opposite ends of a cycle, each ends up parked on a shared
//! construction (a singleton slot or a memo fill) the other one owns, and
//! neither path ever repeats an identifier. Every such wait is recorded
//! here as edges from the frames the waiting chain is executing to the
//! identifier it waits on. A wait that would close a loop of edges is
//! refused with [`DiError::CircularResolution`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::key::ServiceId;

struct Wait {
    frames: SmallVec<[ServiceId; 8]>,
    target: ServiceId,
}

#[derive(Default)]
pub(crate) struct WaitGraph {
    waits: Mutex<AHashMap<u64, Wait>>,
    next_ticket: AtomicU64,
}

impl WaitGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records that a chain executing `frames` is about to wait on `target`.
    ///
    /// Fails if any construction reachable from `target` is itself waiting on
    /// one of `frames`. The returned guard removes the wait when dropped.
    pub(crate) fn enter(
        self: &Arc<Self>,
        frames: &[ServiceId],
        target: &ServiceId,
    ) -> DiResult<WaitGuard> {
        if frames.is_empty() {
            return Ok(WaitGuard::detached());
        }

        let mut waits = self.waits.lock();
        if let Some(route) = route_to_frames(&waits, target, frames) {
            let mut cycle: Vec<ServiceId> = Vec::with_capacity(frames.len() + route.len());
            let start = route.last().and_then(|end| frames.iter().position(|f| f == end));
            cycle.extend(frames[start.unwrap_or(0)..].iter().cloned());
            cycle.extend(route);
            tracing::warn!(id = %target, depth = cycle.len(), "circular wait across resolutions detected");
            return Err(DiError::CircularResolution(cycle));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        waits.insert(
            ticket,
            Wait {
                frames: frames.iter().cloned().collect(),
                target: target.clone(),
            },
        );
        Ok(WaitGuard {
            graph: Some(Arc::clone(self)),
            ticket,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waits.lock().len()
    }
}

/// Breadth-first search from `target` along recorded waits. Returns the route
/// `target, .., f` for the first frame `f` reached.
fn route_to_frames(
    waits: &AHashMap<u64, Wait>,
    target: &ServiceId,
    frames: &[ServiceId],
) -> Option<Vec<ServiceId>> {
    let mut parents: AHashMap<ServiceId, ServiceId> = AHashMap::new();
    let mut seen: AHashSet<ServiceId> = AHashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(target.clone());
    queue.push_back(target.clone());

    while let Some(node) = queue.pop_front() {
        if frames.contains(&node) {
            let mut route = vec![node.clone()];
            let mut cursor = &node;
            while let Some(parent) = parents.get(cursor) {
                route.push(parent.clone());
                cursor = parent;
            }
            route.reverse();
            return Some(route);
        }
        for wait in waits.values().filter(|w| w.frames.contains(&node)) {
            if seen.insert(wait.target.clone()) {
                parents.insert(wait.target.clone(), node.clone());
                queue.push_back(wait.target.clone());
            }
        }
    }
    None
}

/// Live wait registration; dropping it removes the wait.
pub(crate) struct WaitGuard {
    graph: Option<Arc<WaitGraph>>,
    ticket: u64,
}

impl WaitGuard {
    /// Guard for a root chain, which executes no frames and cannot be waited on.
    pub(crate) fn detached() -> Self {
        Self {
            graph: None,
            ticket: 0,
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if let Some(graph) = self.graph.take() {
            graph.waits.lock().remove(&self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ServiceId> {
        names.iter().map(|n| ServiceId::name(*n)).collect()
    }

    #[test]
    fn opposite_waits_close_a_cycle() {
        let graph = Arc::new(WaitGraph::new());
        let _b_waits_on_a = graph.enter(&ids(&["b"]), &ServiceId::name("a")).unwrap();

        match graph.enter(&ids(&["a"]), &ServiceId::name("b")) {
            Err(DiError::CircularResolution(path)) => assert_eq!(path, ids(&["a", "b", "a"])),
            other => panic!("expected circular wait, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn cycle_through_a_third_chain() {
        let graph = Arc::new(WaitGraph::new());
        let _b = graph.enter(&ids(&["b"]), &ServiceId::name("c")).unwrap();
        let _c = graph.enter(&ids(&["c"]), &ServiceId::name("a")).unwrap();

        match graph.enter(&ids(&["root", "a"]), &ServiceId::name("b")) {
            Err(DiError::CircularResolution(path)) => {
                assert_eq!(path, ids(&["a", "b", "c", "a"]))
            }
            other => panic!("expected circular wait, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unrelated_waits_are_allowed() {
        let graph = Arc::new(WaitGraph::new());
        let _first = graph.enter(&ids(&["x"]), &ServiceId::name("shared")).unwrap();
        let _second = graph.enter(&ids(&["y"]), &ServiceId::name("shared")).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn guard_drop_removes_the_wait() {
        let graph = Arc::new(WaitGraph::new());
        let guard = graph.enter(&ids(&["b"]), &ServiceId::name("a")).unwrap();
        drop(guard);
        assert_eq!(graph.len(), 0);
        assert!(graph.enter(&ids(&["a"]), &ServiceId::name("b")).is_ok());
    }

    #[test]
    fn root_waits_are_not_recorded() {
        let graph = Arc::new(WaitGraph::new());
        let _root = graph.enter(&[], &ServiceId::name("a")).unwrap();
        assert_eq!(graph.len(), 0);
    }
}
