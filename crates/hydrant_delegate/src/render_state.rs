//! Render State Machine
//!
//! Wraps the backend's asynchronous render status in the stop → mutate →
//! resume protocol the delegate follows.
//!
//! Two threads talk to the machine:
//!
//! - sync threads call [`RenderStateMachine::interrupt`] (through
//!   `SyncContext::begin_edit`) before touching any backend node, and the
//!   host may [`pause`](RenderStateMachine::pause),
//!   [`resume`](RenderStateMachine::resume) or
//!   [`restart`](RenderStateMachine::restart) at any time;
//! - the render-loop thread polls [`RenderStateMachine::render`] once per tick.
//!
//! The three flags are independent atomics. Only `render` ever asks the
//! backend to begin, restart or resume.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hydrant_backend::{BackendStatus, RenderBackend, SessionContext};
use hydrant_core::{RenderFailure, Result};
use parking_lot::Mutex;

/// Tolerance for shutter and fps comparisons.
const MOTION_EPSILON: f32 = 1e-5;

/// Result of one [`RenderStateMachine::render`] poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The backend is (re)starting or still refining the image.
    Converging,
    /// The image is final.
    Converged,
    /// The render failed and the backend session was ended.
    Aborted,
}

#[derive(Debug, Clone, Copy)]
struct Motion {
    shutter: [f32; 2],
    fps: f32,
}

pub struct RenderStateMachine {
    context: Arc<SessionContext>,
    batch: bool,
    debug_scene: Option<PathBuf>,

    needs_restart: AtomicBool,
    aborted: AtomicBool,
    paused: AtomicBool,

    motion: Mutex<Motion>,
    start_time: Mutex<Instant>,
    last_failure: Mutex<Option<RenderFailure>>,
}

impl RenderStateMachine {
    #[must_use]
    pub fn new(
        context: Arc<SessionContext>,
        batch: bool,
        shutter: [f32; 2],
        fps: f32,
        debug_scene: Option<PathBuf>,
    ) -> Self {
        Self {
            context,
            batch,
            debug_scene,
            needs_restart: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            motion: Mutex::new(Motion { shutter, fps }),
            start_time: Mutex::new(Instant::now()),
            last_failure: Mutex::new(None),
        }
    }

    #[inline]
    fn backend(&self) -> &dyn RenderBackend {
        self.context.backend()
    }

    // ========================================================================
    // Render loop
    // ========================================================================

    /// Polls the backend once and advances the session.
    ///
    /// Never blocks. An aborted machine keeps returning
    /// [`RenderOutcome::Aborted`] until `interrupt(_, true)` clears it.
    pub fn render(&self) -> RenderOutcome {
        if self.aborted.load(Ordering::Acquire) {
            return RenderOutcome::Aborted;
        }

        match self.backend().render_status() {
            BackendStatus::Finished => {
                // Interrupting a finished render does not change its status,
                // so edits made after convergence only show up as this flag.
                if self.needs_restart.swap(false, Ordering::AcqRel) {
                    self.paused.store(false, Ordering::Release);
                    self.write_debug_scene();
                    self.backend().render_restart();
                    self.reset_start_time();
                    log::debug!("Restarting finished render");
                    RenderOutcome::Converging
                } else {
                    RenderOutcome::Converged
                }
            }
            BackendStatus::Paused => {
                if self.needs_restart.swap(false, Ordering::AcqRel) {
                    self.paused.store(false, Ordering::Release);
                    self.write_debug_scene();
                    self.backend().render_restart();
                    self.reset_start_time();
                } else if !self.paused.load(Ordering::Acquire) {
                    self.write_debug_scene();
                    self.backend().render_resume();
                    self.reset_start_time();
                }
                RenderOutcome::Converging
            }
            BackendStatus::Restarting => {
                self.needs_restart.store(false, Ordering::Release);
                self.paused.store(false, Ordering::Release);
                RenderOutcome::Converging
            }
            BackendStatus::Failed => {
                self.aborted.store(true, Ordering::Release);
                self.paused.store(false, Ordering::Release);
                let code = self.backend().render_end();
                let failure = code.failure().unwrap_or(RenderFailure::Generic);
                log::warn!("Render failed: {failure}");
                *self.last_failure.lock() = Some(failure);
                RenderOutcome::Aborted
            }
            status @ (BackendStatus::NotStarted | BackendStatus::Rendering) => {
                self.needs_restart.store(false, Ordering::Release);
                self.paused.store(false, Ordering::Release);
                if status != BackendStatus::Rendering {
                    self.write_debug_scene();
                    self.backend().render_begin();
                    self.reset_start_time();
                }
                RenderOutcome::Converging
            }
        }
    }

    // ========================================================================
    // Edit protocol
    // ========================================================================

    /// Stops in-flight rendering so the caller may mutate backend nodes.
    ///
    /// Blocks until the backend is idle. A no-op in batch mode, where the
    /// scene is fully translated before the only render begins.
    pub fn interrupt(&self, needs_restart: bool, clear_status: bool) {
        if self.batch {
            return;
        }
        if self.backend().render_status() != BackendStatus::NotStarted {
            self.backend().render_interrupt();
        }
        if needs_restart {
            self.needs_restart.store(true, Ordering::Release);
        }
        if clear_status {
            self.aborted.store(false, Ordering::Release);
        }
    }

    /// Stops rendering and keeps it stopped until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.interrupt(false, false);
        self.paused.store(true, Ordering::Release);
    }

    /// Lets the next [`render`](Self::render) poll resume the backend.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Requests a restart on the next [`render`](Self::render) poll.
    pub fn restart(&self) {
        self.paused.store(false, Ordering::Release);
        self.needs_restart.store(true, Ordering::Release);
    }

    /// [`render`](Self::render), reporting an aborted session as
    /// [`HydrantError::RenderFailed`](hydrant_core::HydrantError::RenderFailed).
    pub fn try_render(&self) -> Result<RenderOutcome> {
        match self.render() {
            RenderOutcome::Aborted => {
                Err(self.last_failure().unwrap_or(RenderFailure::Generic).into())
            }
            outcome => Ok(outcome),
        }
    }

    /// Writes the backend scene to `path`.
    pub fn write_scene(&self, path: &Path) -> Result<()> {
        self.context.ensure_active()?;
        self.backend().write_scene(path)?;
        Ok(())
    }

    // ========================================================================
    // Motion settings
    // ========================================================================

    /// Stores a new shutter. Returns `true` when it differs from the current one.
    pub fn update_shutter(&self, shutter: [f32; 2]) -> bool {
        let mut motion = self.motion.lock();
        let changed = (motion.shutter[0] - shutter[0]).abs() > MOTION_EPSILON
            || (motion.shutter[1] - shutter[1]).abs() > MOTION_EPSILON;
        if changed {
            motion.shutter = shutter;
        }
        changed
    }

    /// Stores a new frame rate. Returns `true` when it differs from the current one.
    pub fn update_fps(&self, fps: f32) -> bool {
        let mut motion = self.motion.lock();
        let changed = (motion.fps - fps).abs() > MOTION_EPSILON;
        if changed {
            motion.fps = fps;
        }
        changed
    }

    #[must_use]
    pub fn shutter(&self) -> [f32; 2] {
        self.motion.lock().shutter
    }

    #[must_use]
    pub fn fps(&self) -> f32 {
        self.motion.lock().fps
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Time since the backend last began, restarted or resumed.
    #[must_use]
    pub fn elapsed_render_time(&self) -> Duration {
        let start = *self.start_time.lock();
        start.elapsed()
    }

    /// Why the most recent render failed, if one did.
    #[must_use]
    pub fn last_failure(&self) -> Option<RenderFailure> {
        *self.last_failure.lock()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn needs_restart(&self) -> bool {
        self.needs_restart.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_batch(&self) -> bool {
        self.batch
    }

    fn reset_start_time(&self) {
        *self.start_time.lock() = Instant::now();
    }

    fn write_debug_scene(&self) {
        let Some(path) = &self.debug_scene else {
            return;
        };
        log::warn!("Saving debug scene as {}", path.display());
        if let Err(err) = self.write_scene(path) {
            log::warn!("Unable to write debug scene {}: {err}", path.display());
        }
    }
}

impl std::fmt::Debug for RenderStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStateMachine")
            .field("batch", &self.batch)
            .field("needs_restart", &self.needs_restart())
            .field("aborted", &self.is_aborted())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrant_backend::{MemoryBackend, RenderErrorCode};

    fn machine(batch: bool) -> (Arc<MemoryBackend>, RenderStateMachine) {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = SessionContext::new(backend.clone());
        ctx.acquire();
        let machine = RenderStateMachine::new(ctx, batch, [-0.25, 0.25], 24.0, None);
        (backend, machine)
    }

    #[test]
    fn first_poll_begins_rendering() {
        let (backend, machine) = machine(false);
        assert_eq!(machine.render(), RenderOutcome::Converging);
        assert_eq!(backend.render_status(), BackendStatus::Rendering);
        assert_eq!(machine.render(), RenderOutcome::Converging);
        assert_eq!(backend.counters().begins, 1);
    }

    #[test]
    fn paused_flag_holds_the_backend() {
        let (backend, machine) = machine(false);
        machine.render();
        machine.pause();
        assert_eq!(backend.render_status(), BackendStatus::Paused);

        assert_eq!(machine.render(), RenderOutcome::Converging);
        assert_eq!(backend.counters().resumes, 0);

        machine.resume();
        assert_eq!(backend.counters().resumes, 0);
        machine.render();
        assert_eq!(backend.counters().resumes, 1);
        assert_eq!(backend.render_status(), BackendStatus::Rendering);
    }

    #[test]
    fn paused_with_pending_restart_restarts() {
        let (backend, machine) = machine(false);
        machine.render();
        machine.interrupt(true, false);
        assert_eq!(machine.render(), RenderOutcome::Converging);
        assert_eq!(backend.counters().restarts, 1);
        assert!(!machine.needs_restart());
    }

    #[test]
    fn batch_interrupt_leaves_backend_alone() {
        let (backend, machine) = machine(true);
        machine.render();
        machine.interrupt(true, false);
        assert_eq!(backend.counters().interrupts, 0);
        assert!(!machine.needs_restart());
    }

    #[test]
    fn failure_is_sticky_until_cleared() {
        let (backend, machine) = machine(false);
        machine.render();
        backend.fail(RenderErrorCode::BadCamera);

        assert_eq!(machine.render(), RenderOutcome::Aborted);
        assert_eq!(machine.last_failure(), Some(RenderFailure::BadCamera));
        assert_eq!(machine.render(), RenderOutcome::Aborted);
        assert_eq!(backend.counters().ends, 1);

        machine.interrupt(false, true);
        assert_eq!(machine.render(), RenderOutcome::Converging);
        assert_eq!(backend.counters().begins, 2);
    }

    #[test]
    fn motion_updates_report_changes() {
        let (_, machine) = machine(false);
        assert!(!machine.update_fps(24.0));
        assert!(machine.update_fps(30.0));
        assert!(!machine.update_shutter([-0.25, 0.25]));
        assert!(machine.update_shutter([0.0, 0.5]));
        assert_eq!(machine.shutter(), [0.0, 0.5]);
    }
}
