//! Dirty-bit vocabulary shared with the scene-graph change tracker.
//!
//! Geometric primitives (meshes, curves, points, volumes) and state
//! primitives (cameras, lights, materials) store their dirty state in the same
//! 32-bit word but assign different meanings to the low bits. The named flags
//! below are the geometric vocabulary; the `SPRIM_*` associated constants are
//! the state vocabulary. Which one applies is decided by the kind of the
//! primitive being marked, never by the bits themselves.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u32 {
        const INIT_REPR      = 1 << 0;
        const VARYING        = 1 << 1;
        const PRIM_ID        = 1 << 2;
        const EXTENT         = 1 << 3;
        const DISPLAY_STYLE  = 1 << 4;
        const POINTS         = 1 << 5;
        const PRIMVAR        = 1 << 6;
        const MATERIAL_ID    = 1 << 7;
        const TOPOLOGY       = 1 << 8;
        const TRANSFORM      = 1 << 9;
        const VISIBILITY     = 1 << 10;
        const NORMALS        = 1 << 11;
        const DOUBLE_SIDED   = 1 << 12;
        const CULL_STYLE     = 1 << 13;
        const SUBDIV_TAGS    = 1 << 14;
        const WIDTHS         = 1 << 15;
        const INSTANCER      = 1 << 16;
        const INSTANCE_INDEX = 1 << 17;
        const REPR           = 1 << 18;
        const RENDER_TAG     = 1 << 19;
        const COMPUTATION    = 1 << 20;
        const CATEGORIES     = 1 << 21;
        const VOLUME_FIELD   = 1 << 22;

        /// Everything except [`DirtyBits::VARYING`].
        const ALL_DIRTY = !(1 << 1);
    }
}

impl DirtyBits {
    pub const CLEAN: Self = Self::empty();

    // State primitive vocabulary (cameras, lights, materials).
    pub const SPRIM_TRANSFORM: Self = Self::from_bits_retain(1 << 0);
    pub const SPRIM_PARAMS: Self = Self::from_bits_retain(1 << 1);
    pub const SPRIM_SHADOW_PARAMS: Self = Self::from_bits_retain(1 << 2);
    pub const SPRIM_COLLECTION: Self = Self::from_bits_retain(1 << 3);
    pub const SPRIM_RESOURCE: Self = Self::from_bits_retain(1 << 4);
    pub const SPRIM_ALL: Self = Self::from_bits_retain(0x1f);

    /// True when any bit is set.
    #[inline]
    #[must_use]
    pub fn is_dirty(self) -> bool {
        !self.is_empty()
    }

    /// Global invalidation applied to every geometric primitive when the
    /// shutter interval changes.
    #[must_use]
    pub fn shutter_changed() -> Self {
        Self::POINTS | Self::TRANSFORM | Self::INSTANCER | Self::PRIMVAR
    }

    /// Global invalidation applied when the frame rate changes.
    ///
    /// Velocity-extrapolated instance matrices scale with the frame rate,
    /// so instancer nodes are rebuilt too.
    #[must_use]
    pub fn fps_changed() -> Self {
        Self::POINTS | Self::PRIMVAR | Self::INSTANCER
    }
}
