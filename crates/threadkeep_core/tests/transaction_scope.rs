use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use threadkeep_core::{
    Container, ContainerRepository, Coordinator, EntityKind, Grouping, GroupingRepository, Owner,
    OwnerRepository, ScopeFilter, ScopeMode, StoreConfig, StoreError, TxState,
};
use uuid::Uuid;

fn file_coordinator(path: &Path, attempts: u32, backoff_ms: u64) -> Coordinator {
    let config = StoreConfig::at_path(path).with_retry(attempts, Duration::from_millis(backoff_ms));
    Coordinator::open(&config).unwrap()
}

#[test]
fn failing_scope_leaves_no_partial_effects() {
    let mut coordinator = Coordinator::open_in_memory().unwrap();
    assert_eq!(coordinator.state(), TxState::Idle);

    let owner = Owner::new("ada@example.com", "Ada");
    let container = Container::new(owner.id, "Inbox");
    let stranger = Uuid::new_v4();
    let result = coordinator.write(|scope| {
        scope.owners().create(&owner)?;
        scope.containers().create(&container)?;
        let unknown_participant = Grouping::new(container.id, "orphan", [owner.id, stranger]);
        scope
            .groupings()
            .create(&unknown_participant, ScopeFilter::Unrestricted)?;
        Ok(())
    });

    match result {
        Err(StoreError::NotFound { kind, id }) => {
            assert_eq!(kind, EntityKind::Owner);
            assert_eq!(id, stranger.to_string());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(coordinator.state(), TxState::RolledBack);

    let (owner_left, container_left) = coordinator
        .read(|scope| {
            Ok((
                scope.owners().get(owner.id, ScopeFilter::Unrestricted)?,
                scope
                    .containers()
                    .get(container.id, ScopeFilter::Unrestricted)?,
            ))
        })
        .unwrap();
    assert!(owner_left.is_none());
    assert!(container_left.is_none());
}

#[test]
fn committed_scope_is_durable_and_reads_its_own_writes() {
    let mut coordinator = Coordinator::open_in_memory().unwrap();
    let owner = Owner::new("ada@example.com", "Ada");

    let seen_inside = coordinator
        .write(|scope| {
            scope.owners().create(&owner)?;
            scope.owners().get(owner.id, ScopeFilter::Unrestricted)
        })
        .unwrap();
    assert!(seen_inside.is_some());
    assert_eq!(coordinator.state(), TxState::Committed);

    let after = coordinator
        .read(|scope| scope.owners().get(owner.id, ScopeFilter::Unrestricted))
        .unwrap();
    assert_eq!(after, seen_inside);
}

#[test]
fn dropped_or_rolled_back_scopes_discard_writes() {
    let mut coordinator = Coordinator::open_in_memory().unwrap();
    let dropped = Owner::new("dropped@example.com", "Dropped");
    let rolled_back = Owner::new("rolled@example.com", "Rolled");

    {
        let scope = coordinator.begin(ScopeMode::ReadWrite).unwrap();
        assert_eq!(scope.state(), TxState::Active);
        scope.owners().create(&dropped).unwrap();
    }
    assert_eq!(coordinator.state(), TxState::RolledBack);

    let scope = coordinator.begin(ScopeMode::ReadWrite).unwrap();
    scope.owners().create(&rolled_back).unwrap();
    scope.rollback().unwrap();
    assert_eq!(coordinator.state(), TxState::RolledBack);

    let count = coordinator
        .read(|scope| scope.owners().count(&Default::default()))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn stores_are_cached_per_scope() {
    let mut coordinator = Coordinator::open_in_memory().unwrap();
    let scope = coordinator.begin(ScopeMode::ReadOnly).unwrap();
    assert_eq!(scope.mode(), ScopeMode::ReadOnly);
    assert!(std::ptr::eq(scope.owners(), scope.owners()));
    assert!(std::ptr::eq(scope.items(), scope.items()));
    scope.commit().unwrap();
    assert_eq!(coordinator.state(), TxState::Committed);
}

#[test]
fn read_only_scope_rejects_writes() {
    let mut coordinator = Coordinator::open_in_memory().unwrap();
    let owner = Owner::new("ada@example.com", "Ada");

    let result = coordinator.read(|scope| scope.owners().create(&owner));
    assert!(matches!(result, Err(StoreError::StorageFault(_))));
    assert_eq!(coordinator.state(), TxState::RolledBack);

    let count = coordinator
        .read(|scope| scope.owners().count(&Default::default()))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn write_scopes_work_after_read_only_scopes_end() {
    let mut coordinator = Coordinator::open_in_memory().unwrap();

    let committed = coordinator.begin(ScopeMode::ReadOnly).unwrap();
    committed.commit().unwrap();
    coordinator
        .write(|scope| scope.owners().create(&Owner::new("first@example.com", "First")))
        .unwrap();

    {
        let dropped = coordinator.begin(ScopeMode::ReadOnly).unwrap();
        assert!(dropped
            .owners()
            .create(&Owner::new("never@example.com", "Never"))
            .is_err());
    }
    assert_eq!(coordinator.state(), TxState::RolledBack);
    coordinator
        .write(|scope| scope.owners().create(&Owner::new("second@example.com", "Second")))
        .unwrap();

    let rolled_back = coordinator.begin(ScopeMode::ReadOnly).unwrap();
    rolled_back.rollback().unwrap();
    let count = coordinator
        .write(|scope| {
            scope
                .owners()
                .create(&Owner::new("third@example.com", "Third"))?;
            scope.owners().count(&Default::default())
        })
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn uncommitted_writes_are_invisible_to_other_scopes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("isolation.db");
    let mut writer = file_coordinator(&path, 3, 1);
    let mut reader = file_coordinator(&path, 3, 1);
    let owner = Owner::new("ada@example.com", "Ada");

    let scope = writer.begin(ScopeMode::ReadWrite).unwrap();
    scope.owners().create(&owner).unwrap();

    let during = reader
        .read(|scope| scope.owners().get(owner.id, ScopeFilter::Unrestricted))
        .unwrap();
    assert!(during.is_none());

    scope.commit().unwrap();
    let after = reader
        .read(|scope| scope.owners().get(owner.id, ScopeFilter::Unrestricted))
        .unwrap();
    assert!(after.is_some());
}

#[test]
fn held_writer_lock_surfaces_contention_after_bounded_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contention.db");
    let mut holder = file_coordinator(&path, 3, 1);
    let mut contender = file_coordinator(&path, 2, 1);

    let held = holder.begin(ScopeMode::ReadWrite).unwrap();
    let err = match contender.begin(ScopeMode::ReadWrite) {
        Ok(_) => panic!("writer lock should be held"),
        Err(err) => err,
    };
    match err {
        StoreError::Contention {
            operation,
            attempts,
        } => {
            assert_eq!(operation, "scope.begin");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(contender.state(), TxState::Idle);
    held.rollback().unwrap();

    contender
        .write(|scope| scope.owners().create(&Owner::new("ok@example.com", "Ok")))
        .unwrap();
}

#[test]
fn retry_succeeds_once_writer_lock_is_released() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recovery.db");
    let mut contender = file_coordinator(&path, 6, 20);

    let (locked_tx, locked_rx) = mpsc::channel();
    let holder_path = path.clone();
    let holder = thread::spawn(move || {
        let mut holder = file_coordinator(&holder_path, 1, 1);
        let scope = holder.begin(ScopeMode::ReadWrite).unwrap();
        scope
            .owners()
            .create(&Owner::new("first@example.com", "First"))
            .unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        scope.commit().unwrap();
    });

    locked_rx.recv().unwrap();
    let count = contender
        .write(|scope| {
            scope
                .owners()
                .create(&Owner::new("second@example.com", "Second"))?;
            scope.owners().count(&Default::default())
        })
        .unwrap();
    holder.join().unwrap();
    assert_eq!(count, 2);
}

#[test]
fn zero_scope_timeout_fails_before_any_work() {
    let config = StoreConfig::in_memory().with_scope_timeout(Duration::ZERO);
    let mut coordinator = Coordinator::open(&config).unwrap();

    let err = match coordinator.begin(ScopeMode::ReadWrite) {
        Ok(_) => panic!("deadline already passed"),
        Err(err) => err,
    };
    assert!(matches!(err, StoreError::Timeout { .. }));
    assert_eq!(coordinator.state(), TxState::Idle);
}

#[test]
fn expired_scope_rejects_further_operations_and_rolls_back() {
    let config = StoreConfig::in_memory().with_scope_timeout(Duration::from_millis(40));
    let mut coordinator = Coordinator::open(&config).unwrap();
    let early = Owner::new("early@example.com", "Early");

    let result = coordinator.write(|scope| {
        scope.owners().create(&early)?;
        thread::sleep(Duration::from_millis(60));
        scope
            .owners()
            .create(&Owner::new("late@example.com", "Late"))?;
        Ok(())
    });

    match result {
        Err(StoreError::Timeout { operation }) => assert_eq!(operation, "owner.create"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(coordinator.state(), TxState::RolledBack);
}

#[test]
fn invalid_config_is_rejected_before_opening() {
    let mut config = StoreConfig::in_memory();
    config.max_retry_attempts = 0;
    let err = match Coordinator::open(&config) {
        Ok(_) => panic!("config should be rejected"),
        Err(err) => err,
    };
    assert!(
        matches!(err, StoreError::ValidationFailed { ref field_errors } if field_errors.contains_key("max_retry_attempts"))
    );
}
