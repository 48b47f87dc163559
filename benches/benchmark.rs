use criterion::{Criterion, black_box, criterion_group, criterion_main};

use std::collections::BTreeSet;

use topika::database::{Database, PersistenceMode};
use topika::scope::ScopeKeeper;
use topika::store::{Operation, Store, TopicSeed};

fn merge_chain(c: &mut Criterion) {
    c.bench_function("merge a chain of 100 topics into one", |bencher| {
        bencher.iter(|| {
            let mut db = Database::new(PersistenceMode::InMemory).unwrap();
            let map = db.topic_map();
            for i in 0..100u32 {
                db.apply(Operation::CreateTopic {
                    map,
                    seed: TopicSeed::SubjectIdentifier(format!("http://x/topic/{i}")),
                })
                .unwrap();
            }
            // every topic gains the first topic's identifier, collapsing the
            // whole set into a single survivor one merge at a time
            for i in 1..100u32 {
                let topic = db
                    .topic_by_subject_identifier(&format!("http://x/topic/{i}"))
                    .unwrap();
                db.apply(Operation::AddSubjectIdentifier {
                    topic,
                    iri: "http://x/topic/0".to_owned(),
                })
                .unwrap();
            }
            black_box(db.topics().len())
        })
    });
}

fn scope_interning(c: &mut Criterion) {
    c.bench_function("intern 1000 overlapping scopes", |bencher| {
        bencher.iter(|| {
            let mut keeper = ScopeKeeper::new();
            for i in 0..1000u64 {
                let themes: BTreeSet<u64> = [i % 50, i % 31, i % 7].into_iter().collect();
                keeper.scope_of(themes);
            }
            black_box(keeper.len())
        })
    });
}

criterion_group!(benches, merge_chain, scope_interning);
criterion_main!(benches);
