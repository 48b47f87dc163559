use topika::construct::SnapshotBody;
use topika::database::{Database, PersistenceMode};
use topika::error::TopikaError;
use topika::store::{Operation, Store, TopicSeed};
use topika::transaction::{Transaction, TxState};

fn create_topic(store: &mut dyn Store, iri: &str) -> u64 {
    let map = store.topic_map();
    store
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::SubjectIdentifier(iri.to_owned()),
        })
        .expect("create topic")
        .created
        .expect("created id")
}

#[test]
fn rollback_keeps_the_backing_store_untouched() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    {
        let mut tx = Transaction::begin(&mut db).expect("begin");
        create_topic(&mut tx, "http://x/speculative");
        assert!(
            tx.topic_by_subject_identifier("http://x/speculative").is_some(),
            "visible inside the transaction"
        );
        tx.rollback().expect("rollback");
        assert_eq!(tx.state(), TxState::Closed);
    }
    assert!(
        db.topic_by_subject_identifier("http://x/speculative").is_none(),
        "nothing ever reached the backing store"
    );
    assert!(db.topics().is_empty());
}

#[test]
fn commit_replays_the_log_into_the_backing_store() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    {
        let mut tx = Transaction::begin(&mut db).expect("begin");
        let topic = create_topic(&mut tx, "http://x/kept");
        tx.apply(Operation::CreateName {
            topic,
            typing: None,
            value: "Kept".to_owned(),
            themes: vec![],
        })
        .expect("name");
        tx.commit().expect("commit");
        assert_eq!(tx.state(), TxState::Committed);
    }
    let topic = db
        .topic_by_subject_identifier("http://x/kept")
        .expect("an equivalent topic exists after commit");
    match db.snapshot(topic).expect("snapshot").body {
        SnapshotBody::Topic { names, .. } => {
            assert_eq!(names.len(), 1);
            match db.snapshot(names[0]).expect("name snapshot").body {
                SnapshotBody::Name { value, .. } => assert_eq!(value, "Kept"),
                _ => panic!("expected a name"),
            }
        }
        _ => panic!("expected a topic"),
    }
}

#[test]
fn a_finished_transaction_rejects_further_work() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let mut tx = Transaction::begin(&mut db).expect("begin");
    create_topic(&mut tx, "http://x/a");
    tx.commit().expect("commit");
    let map = tx.topic_map();
    let error = tx
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::None,
        })
        .expect_err("committed transactions are done");
    assert!(matches!(error, TopikaError::Transaction(_)));
    let error = tx.commit().expect_err("commit happens at most once");
    assert!(matches!(error, TopikaError::Transaction(_)));
    let error = tx.rollback().expect_err("nothing left to roll back");
    assert!(matches!(error, TopikaError::Transaction(_)));
}

#[test]
fn transactions_mirror_backing_constructs_on_first_touch() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = create_topic(&mut db, "http://x/existing");
    {
        let mut tx = Transaction::begin(&mut db).expect("begin");
        let local = tx.import(topic).expect("import");
        tx.apply(Operation::AddSubjectIdentifier {
            topic: local,
            iri: "http://x/alias".to_owned(),
        })
        .expect("bind inside the transaction");
        assert!(
            tx.topic_by_subject_identifier("http://x/alias").is_some(),
            "local view sees the new identifier"
        );
        tx.rollback().expect("rollback");
    }
    assert!(
        db.topic_by_subject_identifier("http://x/alias").is_none(),
        "the mirrored copy never wrote back"
    );
    assert_eq!(db.topic_by_subject_identifier("http://x/existing"), Some(topic));
}

#[test]
fn commit_remaps_identities_merged_during_replay() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let existing = create_topic(&mut db, "http://x/a");
    {
        let mut tx = Transaction::begin(&mut db).expect("begin");
        let fresh = create_topic(&mut tx, "http://x/b");
        // provokes a merge with the mirrored copy of `existing`
        tx.apply(Operation::AddSubjectIdentifier {
            topic: fresh,
            iri: "http://x/a".to_owned(),
        })
        .expect("merge inside the transaction");
        // this command still refers to the pre-merge local id; replay must
        // land it on whatever topic survives in the backing store
        tx.apply(Operation::CreateName {
            topic: fresh,
            typing: None,
            value: "Survivor".to_owned(),
            themes: vec![],
        })
        .expect("name");
        tx.commit().expect("commit");
    }
    let merged = db
        .topic_by_subject_identifier("http://x/a")
        .expect("merged topic");
    assert_eq!(db.resolve(existing), merged);
    assert_eq!(
        db.topic_by_subject_identifier("http://x/b"),
        Some(merged),
        "both subject identifiers reach one topic"
    );
    match db.snapshot(merged).expect("snapshot").body {
        SnapshotBody::Topic {
            names,
            subject_identifiers,
            ..
        } => {
            assert_eq!(subject_identifiers.len(), 2);
            assert_eq!(names.len(), 1, "the name landed on the survivor");
        }
        _ => panic!("expected a topic"),
    }
}

#[test]
fn transactions_nest() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    {
        let mut outer = Transaction::begin(&mut db).expect("outer");
        {
            let mut inner = Transaction::begin(&mut outer).expect("inner");
            create_topic(&mut inner, "http://x/nested");
            inner.commit().expect("inner commit");
        }
        assert!(
            outer.topic_by_subject_identifier("http://x/nested").is_some(),
            "the inner commit lands in the outer workspace"
        );
        outer.commit().expect("outer commit");
    }
    assert!(
        db.topic_by_subject_identifier("http://x/nested").is_some(),
        "the outer commit lands in the real store"
    );
}

#[test]
fn nested_rollback_discards_only_the_inner_work() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    {
        let mut outer = Transaction::begin(&mut db).expect("outer");
        create_topic(&mut outer, "http://x/outer");
        {
            let mut inner = Transaction::begin(&mut outer).expect("inner");
            create_topic(&mut inner, "http://x/inner");
            inner.rollback().expect("inner rollback");
        }
        assert!(outer.topic_by_subject_identifier("http://x/inner").is_none());
        assert!(outer.topic_by_subject_identifier("http://x/outer").is_some());
        outer.commit().expect("outer commit");
    }
    assert!(db.topic_by_subject_identifier("http://x/inner").is_none());
    assert!(db.topic_by_subject_identifier("http://x/outer").is_some());
}

#[test]
fn the_command_log_is_digestible() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let mut tx = Transaction::begin(&mut db).expect("begin");
    assert_eq!(tx.log_len(), 0);
    let empty_digest = tx.log_digest();
    create_topic(&mut tx, "http://x/a");
    assert_eq!(tx.log_len(), 1);
    assert_ne!(tx.log_digest(), empty_digest);
    tx.rollback().expect("rollback");
}

#[test]
fn transactional_reads_see_the_backing_store() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let topic = create_topic(&mut db, "http://x/shared");
    let mut db_topics = db.topics();
    db_topics.sort_unstable();
    {
        let tx = Transaction::begin(&mut db).expect("begin");
        assert_eq!(
            tx.topics().len(),
            db_topics.len(),
            "untouched backing topics are visible through the overlay"
        );
        let found = tx
            .topic_by_subject_identifier("http://x/shared")
            .expect("backing lookup through the overlay");
        let snapshot = tx.snapshot(found).expect("snapshot mirrors lazily");
        assert!(matches!(snapshot.body, SnapshotBody::Topic { .. }));
    }
    assert_eq!(db.resolve(topic), topic);
}
