use topika::construct::SnapshotBody;
use topika::database::{Database, PersistenceMode};
use topika::store::{Operation, Store, TopicSeed};

fn topic_by_si(db: &mut Database, iri: &str) -> u64 {
    let map = db.topic_map();
    db.apply(Operation::CreateTopic {
        map,
        seed: TopicSeed::SubjectIdentifier(iri.to_owned()),
    })
    .expect("create topic")
    .created
    .expect("created id")
}

#[test]
fn merge_is_idempotent() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = topic_by_si(&mut db, "http://x/a");
    let same = db
        .apply(Operation::MergeTopics { topic: a, other: a })
        .expect("self merge is a no-op");
    assert_eq!(same.created, Some(a));
    let b = topic_by_si(&mut db, "http://x/b");
    let first = db
        .apply(Operation::MergeTopics { topic: a, other: b })
        .expect("merge")
        .created
        .unwrap();
    let second = db
        .apply(Operation::MergeTopics { topic: a, other: b })
        .expect("merging twice equals merging once")
        .created
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(db.topics().len(), 1, "one surviving topic");
}

#[test]
fn merge_closure_unions_identifiers() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = topic_by_si(&mut db, "http://x/a");
    let b = topic_by_si(&mut db, "http://x/b");
    db.apply(Operation::AddSubjectLocator {
        topic: b,
        iri: "http://x/resource".to_owned(),
    })
    .expect("subject locator");
    db.apply(Operation::AddItemIdentifier {
        construct: b,
        iri: "http://x/doc#b".to_owned(),
    })
    .expect("item identifier");
    let survivor = db
        .apply(Operation::MergeTopics { topic: a, other: b })
        .expect("merge")
        .created
        .unwrap();
    // every identifier either topic ever carried answers to the survivor
    assert_eq!(db.topic_by_subject_identifier("http://x/a"), Some(survivor));
    assert_eq!(db.topic_by_subject_identifier("http://x/b"), Some(survivor));
    assert_eq!(
        db.topic_by_subject_locator("http://x/resource"),
        Some(survivor)
    );
    assert_eq!(
        db.construct_by_item_identifier("http://x/doc#b"),
        Some(survivor)
    );
    let snapshot = db.snapshot(survivor).expect("snapshot");
    match snapshot.body {
        SnapshotBody::Topic {
            subject_identifiers,
            subject_locators,
            ..
        } => {
            assert_eq!(subject_identifiers.len(), 2);
            assert_eq!(subject_locators.len(), 1);
        }
        _ => panic!("expected a topic"),
    }
}

#[test]
fn survivor_is_the_smaller_id() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = topic_by_si(&mut db, "http://x/a");
    let b = topic_by_si(&mut db, "http://x/b");
    assert!(a < b);
    let survivor = db
        .apply(Operation::MergeTopics { topic: b, other: a })
        .expect("merge")
        .created
        .unwrap();
    assert_eq!(survivor, a, "argument order does not decide the survivor");
}

#[test]
fn redirects_are_transitive_and_idempotent() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = topic_by_si(&mut db, "http://x/a");
    let b = topic_by_si(&mut db, "http://x/b");
    let c = topic_by_si(&mut db, "http://x/c");
    db.apply(Operation::MergeTopics { topic: c, other: b })
        .expect("first merge");
    db.apply(Operation::MergeTopics { topic: b, other: a })
        .expect("second merge through a stale id");
    // one topic answers to all three identities
    assert_eq!(db.resolve(a), db.resolve(b));
    assert_eq!(db.resolve(b), db.resolve(c));
    assert_eq!(db.topics().len(), 1);
    assert_eq!(db.topic_by_subject_identifier("http://x/c"), Some(db.resolve(a)));
}

#[test]
fn subject_identifier_collision_merges_instead_of_rejecting() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = topic_by_si(&mut db, "http://x/a");
    let b = topic_by_si(&mut db, "http://x/b");
    db.apply(Operation::AddSubjectIdentifier {
        topic: b,
        iri: "http://x/a".to_owned(),
    })
    .expect("collision resolves by merging");
    let merged = db
        .topic_by_subject_identifier("http://x/a")
        .expect("lookup by a");
    assert_eq!(
        db.topic_by_subject_identifier("http://x/b"),
        Some(merged),
        "both identifiers reach the merged topic"
    );
    assert_eq!(db.resolve(a), merged);
    assert_eq!(db.resolve(b), merged);
}

#[test]
fn merge_redirects_players_types_and_reification() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let map = db.topic_map();
    let a = topic_by_si(&mut db, "http://x/a");
    let b = topic_by_si(&mut db, "http://x/b");
    let assoc_type = topic_by_si(&mut db, "http://x/member-of");
    let role_type = topic_by_si(&mut db, "http://x/member");
    let association = db
        .apply(Operation::CreateAssociation {
            map,
            typing: assoc_type,
            themes: vec![],
        })
        .expect("association")
        .created
        .unwrap();
    let role = db
        .apply(Operation::CreateRole {
            association,
            typing: role_type,
            player: b,
        })
        .expect("role")
        .created
        .unwrap();
    let occurrence_type = topic_by_si(&mut db, "http://x/homepage");
    let occurrence = db
        .apply(Operation::CreateOccurrence {
            topic: a,
            typing: occurrence_type,
            literal: topika::datatype::Literal::string("about b"),
            themes: vec![],
        })
        .expect("occurrence")
        .created
        .unwrap();
    db.apply(Operation::SetReifier {
        construct: occurrence,
        reifier: Some(b),
    })
    .expect("reify");
    let survivor = db
        .apply(Operation::MergeTopics { topic: a, other: b })
        .expect("merge")
        .created
        .unwrap();
    match db.snapshot(role).expect("role snapshot").body {
        SnapshotBody::Role { player, .. } => assert_eq!(player, survivor),
        _ => panic!("expected a role"),
    }
    match db.snapshot(occurrence).expect("occurrence snapshot").body {
        SnapshotBody::Occurrence { reifier, .. } => assert_eq!(reifier, Some(survivor)),
        _ => panic!("expected an occurrence"),
    }
    match db.snapshot(survivor).expect("survivor snapshot").body {
        SnapshotBody::Topic {
            occurrences,
            roles_played,
            reified,
            ..
        } => {
            assert_eq!(occurrences, vec![occurrence]);
            assert_eq!(roles_played, vec![role]);
            assert_eq!(reified, Some(occurrence));
        }
        _ => panic!("expected a topic"),
    }
}

#[test]
fn merging_topics_reifying_different_constructs_fails() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let a = topic_by_si(&mut db, "http://x/a");
    let b = topic_by_si(&mut db, "http://x/b");
    let occurrence_type = topic_by_si(&mut db, "http://x/note");
    let host = topic_by_si(&mut db, "http://x/host");
    let first = db
        .apply(Operation::CreateOccurrence {
            topic: host,
            typing: occurrence_type,
            literal: topika::datatype::Literal::string("one"),
            themes: vec![],
        })
        .expect("occurrence")
        .created
        .unwrap();
    let second = db
        .apply(Operation::CreateOccurrence {
            topic: host,
            typing: occurrence_type,
            literal: topika::datatype::Literal::string("two"),
            themes: vec![],
        })
        .expect("occurrence")
        .created
        .unwrap();
    db.apply(Operation::SetReifier {
        construct: first,
        reifier: Some(a),
    })
    .expect("reify first");
    db.apply(Operation::SetReifier {
        construct: second,
        reifier: Some(b),
    })
    .expect("reify second");
    let error = db
        .apply(Operation::MergeTopics { topic: a, other: b })
        .expect_err("two distinct reified constructs cannot merge");
    assert!(matches!(error, topika::error::TopikaError::Constraint(_)));
}

#[test]
fn duplicate_names_are_coalesced_only_on_request() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/a");
    for _ in 0..2 {
        db.apply(Operation::CreateName {
            topic,
            typing: None,
            value: "Duplicate".to_owned(),
            themes: vec![],
        })
        .expect("name");
    }
    match db.snapshot(topic).expect("snapshot").body {
        SnapshotBody::Topic { names, .. } => {
            assert_eq!(names.len(), 2, "writes never deduplicate by themselves")
        }
        _ => panic!("expected a topic"),
    }
    db.apply(Operation::RemoveDuplicates { topic })
        .expect("maintenance");
    match db.snapshot(topic).expect("snapshot").body {
        SnapshotBody::Topic { names, .. } => assert_eq!(names.len(), 1),
        _ => panic!("expected a topic"),
    }
}
