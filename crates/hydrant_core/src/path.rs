//! Interned scene-graph paths
//!
//! Scene-graph paths are compared and hashed far more often than they are
//! printed, so every path is interned once into a process-wide
//! [`ThreadedRodeo`] and carried around as a compact integer [`Spur`].
//!
//! ```rust,ignore
//! use hydrant_core::PrimPath;
//!
//! let a = PrimPath::new("/World/Mesh");
//! let b = PrimPath::new("/World/Mesh");
//! assert_eq!(a, b); // O(1) comparison
//! ```

use std::fmt;
use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

/// Global path interner.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// An interned, absolute scene-graph path such as `/World/Geo/Mesh`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimPath(Spur);

impl PrimPath {
    /// Interns `path` and returns its handle.
    #[inline]
    pub fn new(path: &str) -> Self {
        Self(INTERNER.get_or_intern(path))
    }

    /// The empty path, used where the host reports "no binding".
    #[must_use]
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Returns the handle of an already interned path without allocating.
    #[inline]
    #[must_use]
    pub fn get(path: &str) -> Option<Self> {
        INTERNER.get(path).map(Self)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        INTERNER.resolve(&self.0)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    /// Name of the last path element (`"Mesh"` for `/World/Mesh`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        let s = self.as_str();
        s.rsplit('/').next().unwrap_or(s)
    }

    /// Parent path, or `None` for the root and the empty path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let s = self.as_str();
        match s.rfind('/') {
            Some(0) if s.len() > 1 => Some(Self::new("/")),
            Some(idx) if idx > 0 => Some(Self::new(&s[..idx])),
            _ => None,
        }
    }

    /// Backend node name for a sub-object owned by this primitive,
    /// e.g. `"/World/Mesh/instancer"`.
    #[must_use]
    pub fn node_name(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.as_str().to_owned()
        } else {
            format!("{}/{suffix}", self.as_str())
        }
    }
}

impl From<&str> for PrimPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimPath({:?})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let a = PrimPath::new("/World/A");
        let b = PrimPath::new("/World/A");
        let c = PrimPath::new("/World/B");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "/World/A");
        assert_eq!(c.to_string(), "/World/B");
    }

    #[test]
    fn test_get() {
        let _ = PrimPath::new("/existing");

        assert!(PrimPath::get("/existing").is_some());
        assert!(PrimPath::get("/never/interned/anywhere").is_none());
    }

    #[test]
    fn test_name_and_parent() {
        let p = PrimPath::new("/World/Geo/Mesh");
        assert_eq!(p.name(), "Mesh");
        assert_eq!(p.parent(), Some(PrimPath::new("/World/Geo")));
        assert_eq!(PrimPath::new("/World").parent(), Some(PrimPath::new("/")));
        assert_eq!(PrimPath::new("/").parent(), None);
        assert!(PrimPath::empty().is_empty());
    }

    #[test]
    fn test_node_name() {
        let p = PrimPath::new("/World/Mesh");
        assert_eq!(p.node_name(""), "/World/Mesh");
        assert_eq!(p.node_name("instancer"), "/World/Mesh/instancer");
    }
}
