use topika::construct::SnapshotBody;
use topika::database::{Database, PersistenceMode};
use topika::datatype::Literal;
use topika::error::TopikaError;
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
fn variant_scope_must_extend_the_name_scope() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/a");
    let t1 = topic_by_si(&mut db, "http://x/t1");
    let t2 = topic_by_si(&mut db, "http://x/t2");
    let name = db
        .apply(Operation::CreateName {
            topic,
            typing: None,
            value: "Base".to_owned(),
            themes: vec![t1],
        })
        .expect("name")
        .created
        .unwrap();
    let error = db
        .apply(Operation::CreateVariant {
            name,
            literal: Literal::string("indistinguishable"),
            themes: vec![t1],
        })
        .expect_err("no theme beyond the name scope");
    assert!(matches!(error, TopikaError::Constraint(_)));
    let variant = db
        .apply(Operation::CreateVariant {
            name,
            literal: Literal::string("sorted form"),
            themes: vec![t1, t2],
        })
        .expect("distinguishable variant")
        .created
        .unwrap();
    // shrinking back to the name scope is equally rejected
    let error = db
        .apply(Operation::RemoveTheme {
            construct: variant,
            theme: t2,
        })
        .expect_err("would become indistinguishable");
    assert!(matches!(error, TopikaError::Constraint(_)));
}

#[test]
fn item_identifier_kind_collision_is_an_identity_error() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/a");
    let occurrence_type = topic_by_si(&mut db, "http://x/note");
    let occurrence = db
        .apply(Operation::CreateOccurrence {
            topic,
            typing: occurrence_type,
            literal: Literal::string("text"),
            themes: vec![],
        })
        .expect("occurrence")
        .created
        .unwrap();
    db.apply(Operation::AddItemIdentifier {
        construct: occurrence,
        iri: "http://x/doc#frag".to_owned(),
    })
    .expect("bind item identifier");
    let map = db.topic_map();
    let error = db
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::ItemIdentifier("http://x/doc#frag".to_owned()),
        })
        .expect_err("an occurrence already owns the item identifier");
    assert!(matches!(error, TopikaError::Identity(_)));
    let error = db
        .apply(Operation::AddItemIdentifier {
            construct: topic,
            iri: "http://x/doc#frag".to_owned(),
        })
        .expect_err("incompatible kinds never merge");
    assert!(matches!(error, TopikaError::Identity(_)));
}

#[test]
fn item_identifier_unification_adopts_the_existing_topic() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let map = db.topic_map();
    let topic = topic_by_si(&mut db, "http://x/a");
    db.apply(Operation::AddItemIdentifier {
        construct: topic,
        iri: "http://x/doc#a".to_owned(),
    })
    .expect("bind item identifier");
    let adopted = db
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::ItemIdentifier("http://x/doc#a".to_owned()),
        })
        .expect("create by the same item identifier")
        .created
        .unwrap();
    assert_eq!(adopted, topic, "no second topic is fabricated");
    assert_eq!(db.topics().len(), 1);
}

#[test]
fn reification_is_one_to_one() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/a");
    let reifier = topic_by_si(&mut db, "http://x/r");
    let occurrence_type = topic_by_si(&mut db, "http://x/note");
    let first = db
        .apply(Operation::CreateOccurrence {
            topic,
            typing: occurrence_type,
            literal: Literal::string("one"),
            themes: vec![],
        })
        .expect("occurrence")
        .created
        .unwrap();
    let second = db
        .apply(Operation::CreateOccurrence {
            topic,
            typing: occurrence_type,
            literal: Literal::string("two"),
            themes: vec![],
        })
        .expect("occurrence")
        .created
        .unwrap();
    db.apply(Operation::SetReifier {
        construct: first,
        reifier: Some(reifier),
    })
    .expect("reify");
    let error = db
        .apply(Operation::SetReifier {
            construct: second,
            reifier: Some(reifier),
        })
        .expect_err("a topic reifies at most one construct");
    assert!(matches!(error, TopikaError::Constraint(_)));
    db.apply(Operation::SetReifier {
        construct: first,
        reifier: None,
    })
    .expect("unreify");
    db.apply(Operation::SetReifier {
        construct: second,
        reifier: Some(reifier),
    })
    .expect("free again");
}

#[test]
fn operations_on_removed_constructs_fail() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/gone");
    db.apply(Operation::Remove {
        construct: topic,
        cascade: false,
    })
    .expect("remove");
    let error = db
        .apply(Operation::AddSubjectIdentifier {
            topic,
            iri: "http://x/other".to_owned(),
        })
        .expect_err("stale id");
    assert!(matches!(error, TopikaError::Removed(_)));
    assert!(db.snapshot(topic).is_err());
    assert!(!db.contains(topic));
}

#[test]
fn removing_a_referenced_topic_needs_cascade() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let map = db.topic_map();
    let player = topic_by_si(&mut db, "http://x/player");
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
            player,
        })
        .expect("role")
        .created
        .unwrap();
    let error = db
        .apply(Operation::Remove {
            construct: player,
            cascade: false,
        })
        .expect_err("still plays a role");
    assert!(matches!(error, TopikaError::InUse { .. }));
    db.apply(Operation::Remove {
        construct: player,
        cascade: true,
    })
    .expect("cascade removes the role too");
    assert!(!db.contains(role));
    match db.snapshot(association).expect("snapshot").body {
        SnapshotBody::Association { roles, .. } => assert!(roles.is_empty()),
        _ => panic!("expected an association"),
    }
    let error = db
        .apply(Operation::Remove {
            construct: assoc_type,
            cascade: false,
        })
        .expect_err("still types the association");
    assert!(matches!(error, TopikaError::InUse { .. }));
}

#[test]
fn mutations_validate_their_references() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/a");
    // the map parameter must name the topic map itself
    let error = db
        .apply(Operation::CreateAssociation {
            map: topic,
            typing: topic,
            themes: vec![],
        })
        .expect_err("a topic does not name the topic map");
    assert!(matches!(error, TopikaError::Constraint(_)));
    // ids that never existed dereference to a removed-construct error
    let error = db
        .apply(Operation::CreateName {
            topic: 424242,
            typing: None,
            value: "orphan".to_owned(),
            themes: vec![],
        })
        .expect_err("unknown topic id");
    assert!(matches!(
        error,
        TopikaError::Removed(_) | TopikaError::Constraint(_)
    ));
    // a non-topic can never serve as a theme
    let name = db
        .apply(Operation::CreateName {
            topic,
            typing: None,
            value: "a name".to_owned(),
            themes: vec![],
        })
        .expect("name")
        .created
        .unwrap();
    let error = db
        .apply(Operation::AddTheme {
            construct: name,
            theme: name,
        })
        .expect_err("a name is not a topic");
    assert!(matches!(error, TopikaError::Constraint(_)));
}

#[test]
fn names_take_the_default_name_type() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = topic_by_si(&mut db, "http://x/a");
    let name = db
        .apply(Operation::CreateName {
            topic,
            typing: None,
            value: "Unnamed type".to_owned(),
            themes: vec![],
        })
        .expect("name")
        .created
        .unwrap();
    let default_type = db
        .topic_by_subject_identifier(topika::database::TOPIC_NAME_TYPE)
        .expect("the default name type topic exists");
    match db.snapshot(name).expect("snapshot").body {
        SnapshotBody::Name { typing, .. } => assert_eq!(typing, default_type),
        _ => panic!("expected a name"),
    }
}
