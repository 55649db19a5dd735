//! Scene-graph change tracker contract.
//!
//! The host scene graph owns per-primitive dirty state. The delegate only
//! pushes extra invalidation into it (dependency notifications, global
//! shutter/fps changes) and reads it back. Geometric and state primitives are
//! marked through different entry points because they interpret the same
//! bits differently (see [`DirtyBits`]).

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::dirty::DirtyBits;
use crate::path::PrimPath;

/// The subset of the host's change tracker the delegate calls into.
pub trait ChangeTracker: Send + Sync {
    /// True when `path` names a geometric primitive.
    fn is_rprim(&self, path: PrimPath) -> bool;

    fn mark_rprim_dirty(&self, path: PrimPath, bits: DirtyBits);

    fn mark_sprim_dirty(&self, path: PrimPath, bits: DirtyBits);

    fn mark_all_rprims_dirty(&self, bits: DirtyBits);

    fn dirty_bits(&self, path: PrimPath) -> DirtyBits;
}

/// Which table a tracked primitive lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedKind {
    Rprim,
    Sprim,
    Instancer,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: TrackedKind,
    bits: DirtyBits,
    marks: u32,
}

/// In-memory change tracker, used by the bundled render index and tests.
#[derive(Debug, Default)]
pub struct MemoryChangeTracker {
    entries: Mutex<FxHashMap<PrimPath, Entry>>,
}

impl MemoryChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `path` with its initial dirty bits.
    pub fn insert(&self, path: PrimPath, kind: TrackedKind, initial: DirtyBits) {
        self.entries.lock().insert(
            path,
            Entry {
                kind,
                bits: initial,
                marks: 0,
            },
        );
    }

    pub fn remove(&self, path: PrimPath) {
        self.entries.lock().remove(&path);
    }

    #[must_use]
    pub fn kind(&self, path: PrimPath) -> Option<TrackedKind> {
        self.entries.lock().get(&path).map(|e| e.kind)
    }

    pub fn set_dirty_bits(&self, path: PrimPath, bits: DirtyBits) {
        if let Some(entry) = self.entries.lock().get_mut(&path) {
            entry.bits = bits;
        }
    }

    pub fn mark_clean(&self, path: PrimPath) {
        self.set_dirty_bits(path, DirtyBits::CLEAN);
    }

    /// Marks a primitive of any kind; used by hosts to inject scene edits.
    pub fn mark_dirty(&self, path: PrimPath, bits: DirtyBits) {
        if let Some(entry) = self.entries.lock().get_mut(&path) {
            entry.bits |= bits;
            entry.marks += 1;
        }
    }

    /// Dirty primitives of `kind`, sorted by path for a stable sync order.
    #[must_use]
    pub fn dirty_prims(&self, kind: TrackedKind) -> Vec<PrimPath> {
        let mut out: Vec<PrimPath> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| e.kind == kind && e.bits.is_dirty())
            .map(|(p, _)| *p)
            .collect();
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        out
    }

    /// Number of times `path` has been marked since it was inserted.
    #[must_use]
    pub fn mark_count(&self, path: PrimPath) -> u32 {
        self.entries.lock().get(&path).map_or(0, |e| e.marks)
    }
}

impl ChangeTracker for MemoryChangeTracker {
    fn is_rprim(&self, path: PrimPath) -> bool {
        self.kind(path) == Some(TrackedKind::Rprim)
    }

    fn mark_rprim_dirty(&self, path: PrimPath, bits: DirtyBits) {
        self.mark_dirty(path, bits);
    }

    fn mark_sprim_dirty(&self, path: PrimPath, bits: DirtyBits) {
        self.mark_dirty(path, bits);
    }

    fn mark_all_rprims_dirty(&self, bits: DirtyBits) {
        for entry in self.entries.lock().values_mut() {
            if entry.kind == TrackedKind::Rprim {
                entry.bits |= bits;
                entry.marks += 1;
            }
        }
    }

    fn dirty_bits(&self, path: PrimPath) -> DirtyBits {
        self.entries
            .lock()
            .get(&path)
            .map_or(DirtyBits::CLEAN, |e| e.bits)
    }
}
