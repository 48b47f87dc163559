use topika::database::{Database, PersistenceMode};
use topika::datatype::Literal;
use topika::jtm;
use topika::store::{Operation, Store, TopicSeed};

#[test]
fn export_produces_jtm_with_all_constructs() {
    let mut db = Database::new(PersistenceMode::InMemory).expect("db");
    let map = db.topic_map();
    let ada = db
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::SubjectIdentifier("http://x/ada".to_owned()),
        })
        .expect("topic")
        .created
        .unwrap();
    let homepage = db
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::SubjectIdentifier("http://x/homepage".to_owned()),
        })
        .expect("topic")
        .created
        .unwrap();
    db.apply(Operation::CreateName {
        topic: ada,
        typing: None,
        value: "Ada".to_owned(),
        themes: vec![],
    })
    .expect("name");
    db.apply(Operation::CreateOccurrence {
        topic: ada,
        typing: homepage,
        literal: Literal::iri("http://example.org/ada").expect("literal"),
        themes: vec![],
    })
    .expect("occurrence");
    let works_at = db
        .apply(Operation::CreateTopic {
            map,
            seed: TopicSeed::SubjectIdentifier("http://x/works-at".to_owned()),
        })
        .expect("topic")
        .created
        .unwrap();
    let association = db
        .apply(Operation::CreateAssociation {
            map,
            typing: works_at,
            themes: vec![],
        })
        .expect("association")
        .created
        .unwrap();
    db.apply(Operation::CreateRole {
        association,
        typing: works_at,
        player: ada,
    })
    .expect("role");

    let exported = jtm::export(&db).expect("export");
    assert_eq!(exported["version"], "1.0");
    assert_eq!(exported["item_type"], "topicmap");
    let topics = exported["topics"].as_array().expect("topics array");
    // ada, homepage, works-at and the default name type
    assert_eq!(topics.len(), 4);
    let ada_entry = topics
        .iter()
        .find(|t| {
            t["subject_identifiers"]
                .as_array()
                .map(|sis| sis.iter().any(|si| si == "http://x/ada"))
                .unwrap_or(false)
        })
        .expect("ada exported");
    assert_eq!(ada_entry["names"][0]["value"], "Ada");
    assert_eq!(
        ada_entry["occurrences"][0]["value"],
        "http://example.org/ada"
    );
    let associations = exported["associations"].as_array().expect("associations");
    assert_eq!(associations.len(), 1);
    assert_eq!(associations[0]["type"], "si:http://x/works-at");
    assert_eq!(associations[0]["roles"][0]["player"], "si:http://x/ada");
}
