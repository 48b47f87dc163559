use std::collections::BTreeSet;
use std::sync::Arc;

use topika::construct::SnapshotBody;
use topika::database::{Database, PersistenceMode};
use topika::scope::ScopeKeeper;
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
fn scope_of_returns_the_same_object_for_the_same_themes() {
    let mut keeper = ScopeKeeper::new();
    let themes: BTreeSet<u64> = [7u64, 11u64].into_iter().collect();
    let (first, existed) = keeper.scope_of(themes.clone());
    assert!(!existed);
    let (second, existed) = keeper.scope_of(themes);
    assert!(existed);
    assert!(
        Arc::ptr_eq(&first, &second),
        "structural identity, not just equality"
    );
}

#[test]
fn the_empty_scope_is_a_singleton() {
    let mut keeper = ScopeKeeper::new();
    let (empty, _) = keeper.scope_of(BTreeSet::new());
    assert!(Arc::ptr_eq(&empty, &keeper.unconstrained()));
    assert!(empty.is_unconstrained());
}

#[test]
fn scopes_containing_honours_match_all() {
    let mut keeper = ScopeKeeper::new();
    let (only_one, _) = keeper.scope_of([1u64].into_iter().collect());
    let (both, _) = keeper.scope_of([1u64, 2u64].into_iter().collect());
    let any = keeper.scopes_containing(&[1, 2], false);
    assert_eq!(any.len(), 2);
    let all = keeper.scopes_containing(&[1, 2], true);
    assert_eq!(all.len(), 1);
    assert!(Arc::ptr_eq(&all[0], &both));
    assert!(any.iter().any(|s| Arc::ptr_eq(s, &only_one)));
}

#[test]
fn merging_themes_consolidates_scopes() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let map = db.topic_map();
    let t1 = topic_by_si(&mut db, "http://x/t1");
    let t2 = topic_by_si(&mut db, "http://x/t2");
    let assoc_type = topic_by_si(&mut db, "http://x/type");
    let first = db
        .apply(Operation::CreateAssociation {
            map,
            typing: assoc_type,
            themes: vec![t1],
        })
        .expect("association")
        .created
        .unwrap();
    let second = db
        .apply(Operation::CreateAssociation {
            map,
            typing: assoc_type,
            themes: vec![t2],
        })
        .expect("association")
        .created
        .unwrap();
    let survivor = db
        .apply(Operation::MergeTopics {
            topic: t1,
            other: t2,
        })
        .expect("merge")
        .created
        .unwrap();
    // exactly one scope object for the merged theme, every construct on it
    let scoped = db.scoped_by_theme(survivor);
    assert_eq!(scoped, vec![first.min(second), first.max(second)]);
    for id in [first, second] {
        match db.snapshot(id).expect("snapshot").body {
            SnapshotBody::Association { themes, .. } => assert_eq!(themes, vec![survivor]),
            _ => panic!("expected an association"),
        }
    }
    assert_eq!(db.resolve(t2), survivor);
}

#[test]
fn scope_index_follows_theme_removal() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let map = db.topic_map();
    let t1 = topic_by_si(&mut db, "http://x/t1");
    let assoc_type = topic_by_si(&mut db, "http://x/type1");
    let association = db
        .apply(Operation::CreateAssociation {
            map,
            typing: assoc_type,
            themes: vec![t1],
        })
        .expect("association")
        .created
        .unwrap();
    assert_eq!(db.associations_by_theme(t1), vec![association]);
    db.apply(Operation::RemoveTheme {
        construct: association,
        theme: t1,
    })
    .expect("unscope");
    assert!(db.associations_by_theme(t1).is_empty());
    match db.snapshot(association).expect("snapshot").body {
        SnapshotBody::Association { themes, .. } => assert!(themes.is_empty()),
        _ => panic!("expected an association"),
    }
}

#[test]
fn theme_substitution_runs_to_a_fixed_point() {
    let mut keeper = ScopeKeeper::new();
    keeper.scope_of([1u64].into_iter().collect());
    keeper.scope_of([1u64, 2u64].into_iter().collect());
    keeper.scope_of([2u64].into_iter().collect());
    let remap = keeper.substitute_theme(1, Some(2));
    // {1} and {1,2} both collapse into the already existing {2}
    assert_eq!(remap.len(), 2);
    assert!(keeper.scopes_with_theme(1).is_empty());
    let survivors = keeper.scopes_with_theme(2);
    assert_eq!(survivors.len(), 1);
    for (_, target) in &remap {
        assert!(Arc::ptr_eq(target, &survivors[0]));
    }
}
