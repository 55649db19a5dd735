//! Cross-primitive dependency tracking.
//!
//! A *source* primitive depends on *target* primitives: a mesh on its bound
//! material, a light on its shader node graph, a projection shader on a
//! camera. Each edge records the dirty bits the source needs when the target
//! changes.
//!
//! Primitive syncs run on many threads, so they never touch the edge maps
//! directly. They push work onto three queues:
//!
//! | queue   | producer call                      | effect at drain                                   |
//! |---------|------------------------------------|---------------------------------------------------|
//! | removal | [`DependencyGraph::remove_target`] | re-sync every source of the target, erase its edges |
//! | track   | [`DependencyGraph::track_dependencies`] | replace the source's whole target set        |
//! | dirty   | [`DependencyGraph::mark_dirty`]    | re-sync every source of the target               |
//!
//! [`DependencyGraph::drain`] runs once per tick on a single thread and
//! processes the queues in exactly that order.

use flume::{Receiver, Sender};
use hydrant_core::{ChangeTracker, DirtyBits, PrimPath};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

type TargetSet = SmallVec<[(PrimPath, DirtyBits); 2]>;

struct TrackRequest {
    source: PrimPath,
    targets: TargetSet,
}

#[derive(Default)]
struct EdgeMaps {
    source_to_targets: FxHashMap<PrimPath, FxHashMap<PrimPath, DirtyBits>>,
    target_to_sources: FxHashMap<PrimPath, FxHashSet<PrimPath>>,
}

impl EdgeMaps {
    /// Replaces `source`'s target set, retiring stale reverse entries.
    fn replace(&mut self, source: PrimPath, targets: TargetSet) {
        let mut next: FxHashMap<PrimPath, DirtyBits> = FxHashMap::default();
        for (target, bits) in targets {
            if target.is_empty() {
                continue;
            }
            *next.entry(target).or_default() |= bits;
        }

        let previous = if next.is_empty() {
            self.source_to_targets.remove(&source)
        } else {
            self.source_to_targets.insert(source, next.clone())
        };

        if let Some(previous) = previous {
            for stale in previous.keys().filter(|t| !next.contains_key(t)) {
                if let Some(sources) = self.target_to_sources.get_mut(stale) {
                    sources.remove(&source);
                    if sources.is_empty() {
                        self.target_to_sources.remove(stale);
                    }
                }
            }
        }

        for target in next.keys() {
            self.target_to_sources
                .entry(*target)
                .or_default()
                .insert(source);
        }
    }

    fn edge_bits(&self, source: PrimPath, target: PrimPath) -> Option<DirtyBits> {
        self.source_to_targets
            .get(&source)
            .and_then(|targets| targets.get(&target))
            .copied()
    }
}

/// Sources to notify at the end of a drain, one entry per source.
#[derive(Default)]
struct Notifications {
    order: Vec<PrimPath>,
    bits: FxHashMap<PrimPath, DirtyBits>,
}

impl Notifications {
    fn push(&mut self, source: PrimPath, bits: DirtyBits) {
        match self.bits.get_mut(&source) {
            Some(existing) => *existing |= bits,
            None => {
                self.bits.insert(source, bits);
                self.order.push(source);
            }
        }
    }
}

pub struct DependencyGraph {
    removal_tx: Sender<PrimPath>,
    removal_rx: Receiver<PrimPath>,
    track_tx: Sender<TrackRequest>,
    track_rx: Receiver<TrackRequest>,
    dirty_tx: Sender<PrimPath>,
    dirty_rx: Receiver<PrimPath>,
    maps: Mutex<EdgeMaps>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        let (removal_tx, removal_rx) = flume::unbounded();
        let (track_tx, track_rx) = flume::unbounded();
        let (dirty_tx, dirty_rx) = flume::unbounded();
        Self {
            removal_tx,
            removal_rx,
            track_tx,
            track_rx,
            dirty_tx,
            dirty_rx,
            maps: Mutex::new(EdgeMaps::default()),
        }
    }

    // ========================================================================
    // Producer side (any thread)
    // ========================================================================

    /// Declares the complete current dependency set of `source`.
    ///
    /// The set replaces the previous one at the next drain; an empty set
    /// retires every edge of `source`. Empty target paths are ignored.
    pub fn track_dependencies<I>(&self, source: PrimPath, targets: I)
    where
        I: IntoIterator<Item = (PrimPath, DirtyBits)>,
    {
        let request = TrackRequest {
            source,
            targets: targets.into_iter().collect(),
        };
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.track_tx.send(request);
    }

    /// Shorthand for an empty [`track_dependencies`](Self::track_dependencies).
    pub fn clear_dependencies(&self, source: PrimPath) {
        self.track_dependencies(source, std::iter::empty());
    }

    /// `target` was deleted: its sources re-sync and its edges go away.
    pub fn remove_target(&self, target: PrimPath) {
        let _ = self.removal_tx.send(target);
    }

    /// `target`'s content changed: its sources re-sync, edges stay.
    pub fn mark_dirty(&self, target: PrimPath) {
        let _ = self.dirty_tx.send(target);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !(self.removal_rx.is_empty() && self.track_rx.is_empty() && self.dirty_rx.is_empty())
    }

    // ========================================================================
    // Consumer side (single thread, once per tick)
    // ========================================================================

    /// Applies every queued request and marks affected sources dirty in the
    /// host's change tracker. Returns `true` when any source was marked.
    ///
    /// Each affected source is marked exactly once per drain, with the union
    /// of the bits recorded on the edges that fired.
    pub fn drain(&self, tracker: &dyn ChangeTracker) -> bool {
        let mut maps = self.maps.lock();
        let mut notify = Notifications::default();

        let mut removals = 0_usize;
        for target in self.removal_rx.try_iter() {
            removals += 1;
            let Some(sources) = maps.target_to_sources.remove(&target) else {
                continue;
            };
            for source in sources {
                let bits = match maps.source_to_targets.get_mut(&source) {
                    Some(targets) => {
                        let bits = targets.remove(&target);
                        if targets.is_empty() {
                            maps.source_to_targets.remove(&source);
                        }
                        bits
                    }
                    None => None,
                };
                notify.push(source, bits.unwrap_or(DirtyBits::ALL_DIRTY));
            }
        }

        let mut tracks = 0_usize;
        for request in self.track_rx.try_iter() {
            tracks += 1;
            maps.replace(request.source, request.targets);
        }

        let mut dirties = 0_usize;
        for target in self.dirty_rx.try_iter() {
            dirties += 1;
            let Some(sources) = maps.target_to_sources.get(&target) else {
                continue;
            };
            for source in sources {
                let bits = maps
                    .edge_bits(*source, target)
                    .unwrap_or(DirtyBits::ALL_DIRTY);
                notify.push(*source, bits);
            }
        }
        drop(maps);

        if removals + tracks + dirties > 0 {
            log::debug!(
                "Dependency drain: {removals} removals, {tracks} track updates, {dirties} dirty targets, {} sources notified",
                notify.order.len()
            );
        }

        for source in &notify.order {
            let bits = notify.bits[source];
            if tracker.is_rprim(*source) {
                tracker.mark_rprim_dirty(*source, bits);
            } else {
                tracker.mark_sprim_dirty(*source, bits);
            }
        }
        !notify.order.is_empty()
    }

    // ========================================================================
    // Queries (reflect the state as of the last drain)
    // ========================================================================

    /// Sources depending on `target`, sorted by path.
    #[must_use]
    pub fn sources_of(&self, target: PrimPath) -> Vec<PrimPath> {
        let mut out: Vec<PrimPath> = self
            .maps
            .lock()
            .target_to_sources
            .get(&target)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        out
    }

    /// Targets of `source` with their edge bits, sorted by path.
    #[must_use]
    pub fn targets_of(&self, source: PrimPath) -> Vec<(PrimPath, DirtyBits)> {
        let mut out: Vec<(PrimPath, DirtyBits)> = self
            .maps
            .lock()
            .source_to_targets
            .get(&source)
            .map(|t| t.iter().map(|(p, b)| (*p, *b)).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        out
    }

    /// True when at least one source depends on `target`.
    #[must_use]
    pub fn is_tracked_target(&self, target: PrimPath) -> bool {
        self.maps.lock().target_to_sources.contains_key(&target)
    }

    /// Number of sources with at least one edge.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.maps.lock().source_to_targets.len()
    }
}
