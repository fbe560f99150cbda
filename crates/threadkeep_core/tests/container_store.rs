use rusqlite::Connection;
use threadkeep_core::db::open_db_in_memory;
use threadkeep_core::repo::container_repo::SqliteContainerRepository;
use threadkeep_core::repo::grouping_repo::SqliteGroupingRepository;
use threadkeep_core::repo::owner_repo::SqliteOwnerRepository;
use threadkeep_core::{
    Container, ContainerFilter, ContainerRepository, EntityKind, Grouping, GroupingRepository,
    Intent, Owner, OwnerId, OwnerRepository, PageRequest, ScopeFilter, StoreError,
};
use uuid::Uuid;

fn owner(conn: &Connection, email: &str) -> OwnerId {
    SqliteOwnerRepository::new(conn)
        .create(&Owner::new(email, "Someone"))
        .unwrap()
        .id
}

#[test]
fn create_requires_existing_owner() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContainerRepository::new(&conn);
    let ghost = Uuid::new_v4();

    let err = repo.create(&Container::new(ghost, "Inbox")).unwrap_err();
    match err {
        StoreError::NotFound { kind, id } => {
            assert_eq!(kind, EntityKind::Owner);
            assert_eq!(id, ghost.to_string());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn create_trims_name_and_roundtrips() {
    let conn = open_db_in_memory().unwrap();
    let ada = owner(&conn, "ada@example.com");
    let repo = SqliteContainerRepository::new(&conn);

    let container = Container::new(ada, "  Projects ").with_description("work stuff");
    let created = repo.create(&container).unwrap();
    assert_eq!(created.name, "Projects");
    assert_eq!(created.description, "work stuff");

    let loaded = repo
        .get(container.id, ScopeFilter::Actor(ada))
        .unwrap()
        .unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn blank_or_oversized_fields_fail_validation() {
    let conn = open_db_in_memory().unwrap();
    let ada = owner(&conn, "ada@example.com");
    let repo = SqliteContainerRepository::new(&conn);

    let err = repo
        .create(&Container::new(ada, "   ").with_description("x".repeat(4001)))
        .unwrap_err();
    let StoreError::ValidationFailed { field_errors } = err else {
        panic!("expected validation failure");
    };
    assert!(field_errors.contains_key("name"));
    assert!(field_errors.contains_key("description"));
}

#[test]
fn grouping_participants_may_read_but_not_write() {
    let conn = open_db_in_memory().unwrap();
    let ada = owner(&conn, "ada@example.com");
    let bob = owner(&conn, "bob@example.com");
    let eve = owner(&conn, "eve@example.com");
    let containers = SqliteContainerRepository::new(&conn);
    let groupings = SqliteGroupingRepository::new(&conn);

    let inbox = containers.create(&Container::new(ada, "Inbox")).unwrap();
    groupings
        .create(
            &Grouping::new(inbox.id, "hello", [bob]),
            ScopeFilter::Actor(ada),
        )
        .unwrap();

    assert!(containers.get(inbox.id, ScopeFilter::Actor(bob)).unwrap().is_some());
    assert!(containers.get(inbox.id, ScopeFilter::Actor(eve)).unwrap().is_none());

    assert!(containers.exists(inbox.id, ScopeFilter::Actor(bob), Intent::Read).unwrap());
    assert!(!containers.exists(inbox.id, ScopeFilter::Actor(bob), Intent::Write).unwrap());
    assert!(!containers.exists(inbox.id, ScopeFilter::Actor(bob), Intent::Delete).unwrap());
    assert!(containers.exists(inbox.id, ScopeFilter::Actor(ada), Intent::Delete).unwrap());

    let mut renamed = inbox.clone();
    renamed.name = "Bob's now".to_string();
    let err = containers.update(&renamed, ScopeFilter::Actor(bob)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            kind: EntityKind::Container,
            ..
        }
    ));

    renamed.name = "Archive".to_string();
    let updated = containers.update(&renamed, ScopeFilter::Actor(ada)).unwrap();
    assert_eq!(updated.name, "Archive");
    assert_eq!(updated.owner_id, ada);
}

#[test]
fn store_delete_refuses_container_with_groupings() {
    let conn = open_db_in_memory().unwrap();
    let ada = owner(&conn, "ada@example.com");
    let bob = owner(&conn, "bob@example.com");
    let containers = SqliteContainerRepository::new(&conn);
    let groupings = SqliteGroupingRepository::new(&conn);

    let inbox = containers.create(&Container::new(ada, "Inbox")).unwrap();
    groupings
        .create(&Grouping::new(inbox.id, "t", [ada]), ScopeFilter::Unrestricted)
        .unwrap();

    assert!(!containers.delete(inbox.id, ScopeFilter::Actor(bob)).unwrap());
    let err = containers
        .delete(inbox.id, ScopeFilter::Actor(ada))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { ref field, .. } if field == "groupings"));

    let empty = containers.create(&Container::new(ada, "Empty")).unwrap();
    assert!(containers.delete(empty.id, ScopeFilter::Actor(ada)).unwrap());
    assert!(containers.get(empty.id, ScopeFilter::Unrestricted).unwrap().is_none());
}

#[test]
fn list_and_count_filter_by_owner_and_visibility() {
    let conn = open_db_in_memory().unwrap();
    let ada = owner(&conn, "ada@example.com");
    let bob = owner(&conn, "bob@example.com");
    let repo = SqliteContainerRepository::new(&conn);

    let first = repo.create(&Container::new(ada, "One")).unwrap();
    let second = repo.create(&Container::new(ada, "Two")).unwrap();
    repo.create(&Container::new(bob, "Bob's")).unwrap();

    let by_owner = ContainerFilter {
        owner_id: Some(ada),
        ..ContainerFilter::default()
    };
    let names: Vec<_> = repo
        .list(&by_owner, PageRequest::default())
        .unwrap()
        .into_iter()
        .map(|container| container.id)
        .collect();
    assert_eq!(names, vec![first.id, second.id]);

    let visible_to_bob = ContainerFilter {
        scope: ScopeFilter::Actor(bob),
        ..ContainerFilter::default()
    };
    assert_eq!(repo.count(&visible_to_bob).unwrap(), 1);
    assert_eq!(repo.count(&ContainerFilter::default()).unwrap(), 3);
}

#[test]
fn corrupt_attribute_text_does_not_block_reads() {
    let conn = open_db_in_memory().unwrap();
    let ada = owner(&conn, "ada@example.com");
    let repo = SqliteContainerRepository::new(&conn);

    let mut container = Container::new(ada, "Projects").with_description("work stuff");
    container
        .attributes
        .insert("color".to_string(), "teal".into());
    let created = repo.create(&container).unwrap();
    conn.execute(
        "UPDATE containers SET attributes = '{broken' WHERE id = ?1;",
        [created.id.to_string()],
    )
    .unwrap();

    let loaded = repo
        .get(created.id, ScopeFilter::Actor(ada))
        .unwrap()
        .unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.owner_id, ada);
    assert_eq!(loaded.name, "Projects");
    assert_eq!(loaded.description, "work stuff");
    assert_eq!(loaded.created_at, created.created_at);
    assert!(loaded.attributes.is_empty());

    let listed = repo
        .list(&ContainerFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].attributes.is_empty());

    // A later update starts from the recovered empty bag.
    let mut patch = loaded.clone();
    patch.attributes.insert("pinned".to_string(), true.into());
    let updated = repo.update(&patch, ScopeFilter::Actor(ada)).unwrap();
    assert_eq!(updated.attributes.len(), 1);
    assert_eq!(updated.attributes.get("pinned"), Some(&true.into()));
}
