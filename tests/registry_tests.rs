//! Node registry and session tests
//!
//! Tests for:
//! - Node reuse vs. replacement through the delegate's registry
//! - Ownership mode selected from settings
//! - Session reference counting across delegates

use std::sync::Arc;

use hydrant::{
    DelegateSettings, MemoryBackend, OwnershipMode, RenderBackend, RenderDelegateCore,
    SessionContext,
};

// ============================================================================
// Helper
// ============================================================================

fn delegate_with(settings: DelegateSettings) -> (Arc<MemoryBackend>, RenderDelegateCore) {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    (backend.clone(), RenderDelegateCore::new(ctx, settings).unwrap())
}

// ============================================================================
// Reuse and replacement
// ============================================================================

#[test]
fn create_same_name_and_type_returns_the_reset_node() {
    let (backend, delegate) = delegate_with(DelegateSettings::default());
    let registry = delegate.registry();
    let first = registry.create_node("foo", "bar").unwrap();
    backend.set_param(first.id(), "p", hydrant::ParamValue::Float(1.0));

    let second = registry.create_node("foo", "bar").unwrap();
    assert_eq!(first, second);
    assert!(backend.param(second.id(), "p").is_none());
}

#[test]
fn create_with_new_type_destroys_the_old_node_once() {
    let (backend, delegate) = delegate_with(DelegateSettings::default());
    let registry = delegate.registry();
    let old = registry.create_node("foo", "bar").unwrap();
    let new = registry.create_node("baz", "bar").unwrap();

    assert_ne!(old, new);
    assert_eq!(backend.destroy_count(old.id()), 1);

    // Destroying the stale handle again is harmless.
    registry.destroy_node(Some(&old));
    assert_eq!(backend.destroy_count(old.id()), 1);
    assert!(backend.is_alive(new.id()));
}

// ============================================================================
// Ownership mode
// ============================================================================

#[test]
fn procedural_parent_borrows_node_lifetime() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    ctx.acquire();
    let parent = backend.create_node("procedural", "outer_proc", None).unwrap();

    let settings = DelegateSettings::from_json(r#"{ "procedural_parent": "outer_proc" }"#).unwrap();
    let delegate = RenderDelegateCore::new(ctx.clone(), settings).unwrap();
    assert_eq!(
        delegate.registry().mode(),
        OwnershipMode::BorrowedFromParent(parent)
    );

    let node = delegate.registry().create_node("polymesh", "/borrowed/mesh").unwrap();
    assert_eq!(backend.node_parent(node.id()), Some(parent));
    delegate.registry().destroy_node(Some(&node));
    assert!(backend.is_alive(node.id()));
    assert!(backend.is_disabled(node.id()));
    assert!(delegate.registry().borrowed_nodes().contains(&node));
}

#[test]
fn missing_procedural_parent_falls_back_to_owned() {
    let settings = DelegateSettings {
        procedural_parent: Some("nowhere".to_owned()),
        ..Default::default()
    };
    let (_, delegate) = delegate_with(settings);
    assert_eq!(delegate.registry().mode(), OwnershipMode::Owned);
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn delegates_share_one_session() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());

    let first = RenderDelegateCore::new(ctx.clone(), DelegateSettings::default()).unwrap();
    let second = RenderDelegateCore::new(ctx.clone(), DelegateSettings::default()).unwrap();
    assert_eq!(ctx.ref_count(), 2);
    assert_eq!(backend.counters().sessions_begun, 1);

    drop(first);
    assert_eq!(backend.counters().sessions_ended, 0);
    drop(second);
    assert_eq!(backend.counters().sessions_ended, 1);
    assert!(!ctx.is_active());
}

#[test]
fn independent_contexts_do_not_interfere() {
    let (backend_a, a) = delegate_with(DelegateSettings::default());
    let (backend_b, b) = delegate_with(DelegateSettings::default());
    drop(a);
    assert_eq!(backend_a.counters().sessions_ended, 1);
    assert_eq!(backend_b.counters().sessions_ended, 0);
    drop(b);
}
