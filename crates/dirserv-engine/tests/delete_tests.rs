//! Delete Operation Tests
//!
//! Delete semantics through the engine pipeline:
//! - Leaf deletes and the non-leaf guard
//! - Subtree delete under its control
//! - Writability gates (server-wide and backend-level)
//! - Change listener notification and change numbers
//! - Identity registry cleanup when a bound account is deleted
//! - Busy verdicts while the target is read-locked

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use dirserv_core::control::OID_SUBTREE_DELETE;
use dirserv_core::{Control, Dn, Entry, ResultCode};
use dirserv_engine::{
    Backend, BindRequest, ChangeListener, DeleteRequest, Engine, EngineConfig, MemoryBackend,
    Operation, OperationPayload, WritabilityMode,
};
use dirserv_policy::AccountState;

fn dn(text: &str) -> Dn {
    Dn::parse(text).unwrap()
}

fn subtree_delete_control() -> Control {
    Control {
        oid: OID_SUBTREE_DELETE.to_string(),
        criticality: false,
        value: None,
    }
}

/// Records every notification it receives.
#[derive(Default)]
struct RecordingListener {
    deletions: Mutex<Vec<(Dn, i64)>>,
    calls: AtomicUsize,
}

impl ChangeListener for RecordingListener {
    fn entry_deleted(&self, dn: &Dn, change_number: i64) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.deletions
            .lock()
            .unwrap()
            .push((dn.clone(), change_number));
    }
}

async fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    for (entry_dn, classes) in [
        ("o=test", vec!["top", "organization"]),
        ("ou=people,o=test", vec!["top", "organizationalUnit"]),
        ("uid=rogasawara,ou=people,o=test", vec!["top", "person"]),
        ("uid=tanaka,ou=people,o=test", vec!["top", "person"]),
        ("ou=groups,o=test", vec!["top", "organizationalUnit"]),
    ] {
        backend
            .insert(
                Entry::new(dn(entry_dn))
                    .with_attribute("objectClass", classes)
                    .unwrap(),
            )
            .await;
    }
    backend
}

async fn run_delete(engine: &Engine, target: &str, controls: Vec<Control>) -> Operation {
    let connection = engine.connections().open(None).await;
    let mut op = engine
        .new_operation(connection, 1, OperationPayload::Delete(DeleteRequest::new(target)))
        .await
        .unwrap();
    for control in controls {
        op.add_request_control(control);
    }
    engine.run(&mut op).await.unwrap();
    op
}

// =============================================================================
// Leaf deletes
// =============================================================================

#[tokio::test]
async fn test_delete_leaf_entry() {
    let backend = seeded_backend().await;
    let engine = Engine::builder(backend.clone())
        .build()
        .unwrap();

    let op = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;

    assert_eq!(op.result(), Some(ResultCode::Success));
    assert!(backend
        .lookup(&dn("uid=tanaka,ou=people,o=test")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_missing_entry() {
    let engine = Engine::builder(seeded_backend().await).build().unwrap();
    let op = run_delete(&engine, "uid=ghost,ou=people,o=test", Vec::new()).await;
    assert_eq!(op.result(), Some(ResultCode::NoSuchObject));
}

#[tokio::test]
async fn test_delete_malformed_dn() {
    let engine = Engine::builder(seeded_backend().await).build().unwrap();
    let op = run_delete(&engine, "not a dn", Vec::new()).await;
    assert_eq!(op.result(), Some(ResultCode::InvalidDnSyntax));
}

#[tokio::test]
async fn test_delete_non_leaf_without_control() {
    let backend = seeded_backend().await;
    let engine = Engine::builder(backend.clone()).build().unwrap();

    let op = run_delete(&engine, "ou=people,o=test", Vec::new()).await;

    assert_eq!(op.result(), Some(ResultCode::NotAllowedOnNonLeaf));
    assert!(backend.lookup(&dn("ou=people,o=test")).await.unwrap().is_some());
}

// =============================================================================
// Subtree delete
// =============================================================================

#[tokio::test]
async fn test_subtree_delete_removes_descendants() {
    let backend = seeded_backend().await;
    let engine = Engine::builder(backend.clone()).build().unwrap();

    let op = run_delete(&engine, "ou=people,o=test", vec![subtree_delete_control()]).await;

    assert_eq!(op.result(), Some(ResultCode::Success));
    assert!(backend.lookup(&dn("ou=people,o=test")).await.unwrap().is_none());
    assert!(backend
        .lookup(&dn("uid=rogasawara,ou=people,o=test")).await.unwrap().is_none());
    assert!(backend
        .lookup(&dn("uid=tanaka,ou=people,o=test")).await.unwrap().is_none());
    // Siblings survive.
    assert!(backend.lookup(&dn("ou=groups,o=test")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_subtree_delete_notifies_once_per_entry() {
    let backend = seeded_backend().await;
    let listener = Arc::new(RecordingListener::default());
    let engine = Engine::builder(backend)
        .change_listener(listener.clone())
        .build()
        .unwrap();

    let op = run_delete(&engine, "ou=people,o=test", vec![subtree_delete_control()]).await;

    assert_eq!(op.result(), Some(ResultCode::Success));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 3);
    let deletions = listener.deletions.lock().unwrap();
    // Children are announced before their parent.
    assert_eq!(deletions.last().unwrap().0, dn("ou=people,o=test"));
}

// =============================================================================
// Change numbers
// =============================================================================

#[tokio::test]
async fn test_change_numbers_are_monotonic() {
    let listener = Arc::new(RecordingListener::default());
    let engine = Engine::builder(seeded_backend().await)
        .change_listener(listener.clone())
        .build()
        .unwrap();

    let first = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;
    let second = run_delete(&engine, "uid=rogasawara,ou=people,o=test", Vec::new()).await;

    let first_number = match first.payload() {
        OperationPayload::Delete(request) => request.change_number().unwrap(),
        _ => unreachable!(),
    };
    let second_number = match second.payload() {
        OperationPayload::Delete(request) => request.change_number().unwrap(),
        _ => unreachable!(),
    };
    assert!(second_number > first_number);
}

#[tokio::test]
async fn test_failed_delete_assigns_no_change_number() {
    let listener = Arc::new(RecordingListener::default());
    let engine = Engine::builder(seeded_backend().await)
        .change_listener(listener.clone())
        .build()
        .unwrap();

    let op = run_delete(&engine, "uid=ghost,ou=people,o=test", Vec::new()).await;

    assert_eq!(op.result(), Some(ResultCode::NoSuchObject));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
    if let OperationPayload::Delete(request) = op.payload() {
        assert!(request.change_number().is_none());
    }
}

// =============================================================================
// Writability
// =============================================================================

#[tokio::test]
async fn test_server_writability_disabled_rejects_delete() {
    let backend = seeded_backend().await;
    let config = EngineConfig {
        writability_mode: WritabilityMode::Disabled,
        ..EngineConfig::default()
    };
    let engine = Engine::builder(backend.clone())
        .config(config)
        .build()
        .unwrap();

    let op = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;

    assert_eq!(op.result(), Some(ResultCode::UnwillingToPerform));
    assert!(backend
        .lookup(&dn("uid=tanaka,ou=people,o=test")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_internal_only_writability_rejects_external_delete() {
    let config = EngineConfig {
        writability_mode: WritabilityMode::InternalOnly,
        ..EngineConfig::default()
    };
    let engine = Engine::builder(seeded_backend().await)
        .config(config)
        .build()
        .unwrap();

    let op = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;
    assert_eq!(op.result(), Some(ResultCode::UnwillingToPerform));
}

#[tokio::test]
async fn test_internal_only_writability_accepts_internal_delete() {
    let config = EngineConfig {
        writability_mode: WritabilityMode::InternalOnly,
        ..EngineConfig::default()
    };
    let engine = Engine::builder(seeded_backend().await)
        .config(config)
        .build()
        .unwrap();
    let connection = engine.connections().open(None).await;
    let mut op = engine
        .new_operation(
            connection,
            1,
            OperationPayload::Delete(DeleteRequest::new("uid=tanaka,ou=people,o=test")),
        )
        .await
        .unwrap();
    op.set_internal(true);
    engine.run(&mut op).await.unwrap();
    assert_eq!(op.result(), Some(ResultCode::Success));
}

#[tokio::test]
async fn test_backend_writability_disabled_rejects_delete() {
    let backend = seeded_backend().await;
    backend.set_writability(WritabilityMode::Disabled).await;
    let engine = Engine::builder(backend).build().unwrap();

    let op = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;
    assert_eq!(op.result(), Some(ResultCode::UnwillingToPerform));
}

// =============================================================================
// Identity registry cleanup
// =============================================================================

#[tokio::test]
async fn test_deleting_bound_account_deregisters_identity() {
    let backend = seeded_backend().await;
    backend
        .insert_state(
            dn("uid=tanaka,ou=people,o=test"),
            AccountState {
                passwords: vec!["{CLEAR}tanaka".to_string()],
                ..AccountState::default()
            },
        )
        .await;
    let engine = Engine::builder(backend).build().unwrap();

    let connection = engine.connections().open(None).await;
    let mut bind = engine
        .new_operation(
            connection,
            1,
            OperationPayload::Bind(BindRequest::simple("uid=tanaka,ou=people,o=test", "tanaka")),
        )
        .await
        .unwrap();
    engine.run(&mut bind).await.unwrap();
    assert_eq!(bind.result(), Some(ResultCode::Success));
    assert_eq!(
        engine
            .connections()
            .connections_bound_as(&dn("uid=tanaka,ou=people,o=test"))
            .await,
        vec![connection]
    );

    let op = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;
    assert_eq!(op.result(), Some(ResultCode::Success));
    assert!(engine
        .connections()
        .connections_bound_as(&dn("uid=tanaka,ou=people,o=test"))
        .await
        .is_empty());
}

// =============================================================================
// Locking
// =============================================================================

#[tokio::test]
async fn test_delete_is_busy_while_target_read_locked() {
    let backend = seeded_backend().await;
    let engine = Engine::builder(backend.clone()).build().unwrap();
    let _read_guard = engine
        .locks()
        .lock_read(&dn("uid=tanaka,ou=people,o=test"))
        .await
        .unwrap();

    let op = run_delete(&engine, "uid=tanaka,ou=people,o=test", Vec::new()).await;

    assert_eq!(op.result(), Some(ResultCode::Busy));
    assert!(backend
        .lookup(&dn("uid=tanaka,ou=people,o=test")).await.unwrap().is_some());
}
