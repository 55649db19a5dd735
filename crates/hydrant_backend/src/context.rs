//! Process-wide renderer session.
//!
//! The renderer supports one session per process. Every delegate instance
//! shares a [`SessionContext`] and holds a reference on it: the first
//! [`acquire`](SessionContext::acquire) begins the backend session and the
//! last [`release`](SessionContext::release) ends it. Tests build as many
//! independent contexts as they like.

use std::sync::Arc;

use hydrant_core::{HydrantError, Result};
use parking_lot::Mutex;

use crate::api::RenderBackend;

pub struct SessionContext {
    backend: Arc<dyn RenderBackend>,
    refs: Mutex<usize>,
}

impl SessionContext {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            refs: Mutex::new(0),
        })
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    /// Takes a reference, beginning the backend session on the first one.
    pub fn acquire(&self) {
        let mut refs = self.refs.lock();
        if *refs == 0 {
            log::info!("Beginning render session");
            self.backend.begin_session();
        }
        *refs += 1;
    }

    /// Drops a reference, ending the backend session with the last one.
    pub fn release(&self) {
        let mut refs = self.refs.lock();
        match *refs {
            0 => log::warn!("Render session released more often than acquired"),
            1 => {
                *refs = 0;
                log::info!("Ending render session");
                self.backend.end_session();
            }
            _ => *refs -= 1,
        }
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        *self.refs.lock()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ref_count() > 0
    }

    /// Fails with [`HydrantError::SessionInactive`] when nobody holds a reference.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(HydrantError::SessionInactive)
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn first_acquire_and_last_release_drive_the_session() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = SessionContext::new(backend.clone());

        ctx.acquire();
        ctx.acquire();
        assert_eq!(ctx.ref_count(), 2);
        assert_eq!(backend.counters().sessions_begun, 1);

        ctx.release();
        assert!(ctx.is_active());
        assert_eq!(backend.counters().sessions_ended, 0);

        ctx.release();
        assert!(!ctx.is_active());
        assert_eq!(backend.counters().sessions_ended, 1);

        // Unbalanced release is tolerated.
        ctx.release();
        assert_eq!(backend.counters().sessions_ended, 1);
    }

    #[test]
    fn inactive_session_is_reported() {
        let ctx = SessionContext::new(Arc::new(MemoryBackend::new()));
        assert!(matches!(ctx.ensure_active(), Err(HydrantError::SessionInactive)));
        ctx.acquire();
        assert!(ctx.ensure_active().is_ok());
    }
}
