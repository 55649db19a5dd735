//! RenderStateMachine tests
//!
//! Tests for:
//! - Begin, restart and resume transitions driven by backend status
//! - Restart after convergence
//! - Failure classification and recovery
//! - Debug scene dumps
//! - Batch mode

use std::sync::Arc;

use hydrant::delegate::RenderStateMachine;
use hydrant::{
    BackendStatus, HydrantError, MemoryBackend, RenderBackend, RenderErrorCode, RenderFailure,
    RenderOutcome, SessionContext,
};

// ============================================================================
// Helper
// ============================================================================

fn setup(batch: bool) -> (Arc<MemoryBackend>, RenderStateMachine) {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    ctx.acquire();
    let machine = RenderStateMachine::new(ctx, batch, [-0.25, 0.25], 24.0, None);
    (backend, machine)
}

// ============================================================================
// Transitions
// ============================================================================

#[test]
fn interrupt_after_convergence_restarts_exactly_once() {
    let (backend, machine) = setup(false);
    assert_eq!(machine.render(), RenderOutcome::Converging);
    backend.advance();
    assert_eq!(machine.render(), RenderOutcome::Converged);

    machine.interrupt(true, false);
    assert_eq!(backend.render_status(), BackendStatus::Finished);
    assert_eq!(machine.render(), RenderOutcome::Converging);
    assert_eq!(backend.counters().restarts, 1);

    // Restarting, then rendering, then finished again.
    assert_eq!(machine.render(), RenderOutcome::Converging);
    backend.advance();
    assert_eq!(machine.render(), RenderOutcome::Converging);
    backend.advance();
    assert_eq!(machine.render(), RenderOutcome::Converged);
    assert_eq!(backend.counters().restarts, 1);
}

#[test]
fn interrupt_while_rendering_restarts_on_next_poll() {
    let (backend, machine) = setup(false);
    machine.render();
    machine.interrupt(true, false);
    assert_eq!(backend.render_status(), BackendStatus::Paused);

    assert_eq!(machine.render(), RenderOutcome::Converging);
    assert_eq!(backend.render_status(), BackendStatus::Restarting);
    assert_eq!(backend.counters().resumes, 0);
}

#[test]
fn interrupt_without_restart_resumes() {
    let (backend, machine) = setup(false);
    machine.render();
    machine.interrupt(false, false);
    assert_eq!(machine.render(), RenderOutcome::Converging);
    assert_eq!(backend.counters().resumes, 1);
    assert_eq!(backend.counters().restarts, 0);
}

#[test]
fn host_restart_request_wins_over_pause() {
    let (backend, machine) = setup(false);
    machine.render();
    machine.pause();
    machine.restart();
    assert!(!machine.is_paused());
    assert_eq!(machine.render(), RenderOutcome::Converging);
    assert_eq!(backend.counters().restarts, 1);
}

#[test]
fn interrupt_before_begin_does_not_touch_backend() {
    let (backend, machine) = setup(false);
    machine.interrupt(true, false);
    assert_eq!(backend.counters().interrupts, 0);
    assert!(machine.needs_restart());

    assert_eq!(machine.render(), RenderOutcome::Converging);
    assert_eq!(backend.counters().begins, 1);
    assert!(!machine.needs_restart());
}

// ============================================================================
// Failure
// ============================================================================

#[test]
fn failure_codes_are_classified() {
    let cases = [
        (RenderErrorCode::NoCamera, RenderFailure::NoCamera),
        (RenderErrorCode::Validation, RenderFailure::ValidationFailed),
        (RenderErrorCode::Success, RenderFailure::Generic),
    ];
    for (code, failure) in cases {
        let (backend, machine) = setup(false);
        machine.render();
        backend.fail(code);
        assert_eq!(machine.render(), RenderOutcome::Aborted);
        assert_eq!(machine.last_failure(), Some(failure));
        assert!(machine.is_aborted());
    }
}

#[test]
fn interrupt_without_clear_keeps_abort() {
    let (backend, machine) = setup(false);
    machine.render();
    backend.fail(RenderErrorCode::NoOutputs);
    machine.render();

    machine.interrupt(true, false);
    assert_eq!(machine.render(), RenderOutcome::Aborted);
    machine.interrupt(true, true);
    assert_eq!(machine.render(), RenderOutcome::Converging);
    assert_eq!(backend.render_status(), BackendStatus::Rendering);
}

#[test]
fn try_render_reports_the_failure() {
    let (backend, machine) = setup(false);
    assert_eq!(machine.try_render().unwrap(), RenderOutcome::Converging);
    backend.fail(RenderErrorCode::NoCamera);

    let err = machine.try_render().unwrap_err();
    assert!(matches!(err, HydrantError::RenderFailed(RenderFailure::NoCamera)));
    assert_eq!(err.to_string(), "Render failed: Camera not defined.");
    // Still aborted on the next poll.
    assert!(matches!(
        machine.try_render(),
        Err(HydrantError::RenderFailed(RenderFailure::NoCamera))
    ));
}

// ============================================================================
// Debug scene and batch mode
// ============================================================================

#[test]
fn debug_scene_is_written_before_begin_and_restart() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    ctx.acquire();
    let dump = std::env::temp_dir().join("hydrant_render_state_debug_scene.txt");
    let machine = RenderStateMachine::new(ctx, false, [-0.25, 0.25], 24.0, Some(dump.clone()));

    machine.render();
    assert_eq!(backend.counters().scene_writes, 1);
    machine.interrupt(true, false);
    machine.render();
    assert_eq!(backend.counters().scene_writes, 2);

    // Restarting and rendering states do not dump.
    machine.render();
    assert_eq!(backend.counters().scene_writes, 2);
    let _ = std::fs::remove_file(dump);
}

#[test]
fn write_scene_surfaces_io_errors() {
    let (backend, machine) = setup(false);
    let missing = std::env::temp_dir()
        .join("hydrant_no_such_dir")
        .join("nested")
        .join("scene.txt");
    assert!(matches!(machine.write_scene(&missing), Err(HydrantError::Io(_))));

    let dump = std::env::temp_dir().join("hydrant_render_state_write_scene.txt");
    machine.write_scene(&dump).unwrap();
    assert!(dump.exists());
    assert_eq!(backend.counters().scene_writes, 2);
    let _ = std::fs::remove_file(dump);
}

#[test]
fn write_scene_requires_an_active_session() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    let machine = RenderStateMachine::new(ctx, false, [-0.25, 0.25], 24.0, None);
    let dump = std::env::temp_dir().join("hydrant_render_state_inactive.txt");

    assert!(matches!(machine.write_scene(&dump), Err(HydrantError::SessionInactive)));
    assert_eq!(backend.counters().scene_writes, 0);
}

#[test]
fn batch_mode_never_interrupts() {
    let (backend, machine) = setup(true);
    machine.render();
    machine.pause();
    machine.interrupt(true, true);
    assert_eq!(backend.counters().interrupts, 0);
    assert_eq!(backend.render_status(), BackendStatus::Rendering);
    assert!(machine.is_batch());
}

#[test]
fn elapsed_time_restarts_with_the_render() {
    let (_, machine) = setup(false);
    std::thread::sleep(std::time::Duration::from_millis(20));
    let before = machine.elapsed_render_time();
    machine.render();
    assert!(machine.elapsed_render_time() < before);
}
