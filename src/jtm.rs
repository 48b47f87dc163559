//! JTM 1.0 (JSON Topic Maps) export.
//!
//! Works against any [`Store`], so a transaction can be exported before it
//! is committed. Topics are referenced the JTM way, by one of their
//! locators (`si:`, `sl:` or `ii:` prefixed); topics carrying no locator at
//! all get a synthetic item identifier derived from their id.

use serde_json::{Value, json};

use crate::construct::{SnapshotBody, Tid};
use crate::error::Result;
use crate::store::Store;

fn topic_ref(store: &dyn Store, id: Tid) -> Result<String> {
    let snapshot = store.snapshot(id)?;
    if let SnapshotBody::Topic {
        subject_identifiers,
        subject_locators,
        ..
    } = &snapshot.body
    {
        if let Some(iri) = subject_identifiers.first() {
            return Ok(format!("si:{iri}"));
        }
        if let Some(iri) = subject_locators.first() {
            return Ok(format!("sl:{iri}"));
        }
    }
    if let Some(iri) = snapshot.item_identifiers.first() {
        return Ok(format!("ii:{iri}"));
    }
    Ok(format!("ii:urn:x-topika:id:{id}"))
}

fn scope_refs(store: &dyn Store, themes: &[Tid]) -> Result<Option<Vec<String>>> {
    if themes.is_empty() {
        return Ok(None);
    }
    let mut refs = Vec::with_capacity(themes.len());
    for theme in themes {
        refs.push(topic_ref(store, *theme)?);
    }
    Ok(Some(refs))
}

fn reifier_ref(store: &dyn Store, reifier: Option<Tid>) -> Result<Value> {
    Ok(match reifier {
        Some(id) => Value::String(topic_ref(store, id)?),
        None => Value::Null,
    })
}

/// Serialize the whole topic map as a JTM 1.0 value.
pub fn export(store: &dyn Store) -> Result<Value> {
    let mut topics = Vec::new();
    for id in store.topics() {
        let snapshot = store.snapshot(id)?;
        let SnapshotBody::Topic {
            subject_identifiers,
            subject_locators,
            names,
            occurrences,
            ..
        } = &snapshot.body
        else {
            continue;
        };
        let mut item_identifiers = snapshot.item_identifiers.clone();
        if subject_identifiers.is_empty()
            && subject_locators.is_empty()
            && item_identifiers.is_empty()
        {
            item_identifiers.push(format!("urn:x-topika:id:{id}"));
        }
        let mut name_values = Vec::new();
        for name in names {
            let name_snapshot = store.snapshot(*name)?;
            let SnapshotBody::Name {
                typing,
                value,
                themes,
                reifier,
                variants,
            } = &name_snapshot.body
            else {
                continue;
            };
            let mut variant_values = Vec::new();
            for variant in variants {
                let variant_snapshot = store.snapshot(*variant)?;
                let SnapshotBody::Variant {
                    literal,
                    themes,
                    reifier,
                } = &variant_snapshot.body
                else {
                    continue;
                };
                variant_values.push(json!({
                    "value": literal.value(),
                    "datatype": literal.datatype(),
                    "scope": scope_refs(store, themes)?,
                    "reifier": reifier_ref(store, *reifier)?,
                }));
            }
            name_values.push(json!({
                "value": value,
                "type": topic_ref(store, *typing)?,
                "scope": scope_refs(store, themes)?,
                "reifier": reifier_ref(store, *reifier)?,
                "variants": variant_values,
            }));
        }
        let mut occurrence_values = Vec::new();
        for occurrence in occurrences {
            let occurrence_snapshot = store.snapshot(*occurrence)?;
            let SnapshotBody::Occurrence {
                typing,
                literal,
                themes,
                reifier,
            } = &occurrence_snapshot.body
            else {
                continue;
            };
            occurrence_values.push(json!({
                "value": literal.value(),
                "datatype": literal.datatype(),
                "type": topic_ref(store, *typing)?,
                "scope": scope_refs(store, themes)?,
                "reifier": reifier_ref(store, *reifier)?,
            }));
        }
        topics.push(json!({
            "subject_identifiers": subject_identifiers,
            "subject_locators": subject_locators,
            "item_identifiers": item_identifiers,
            "names": name_values,
            "occurrences": occurrence_values,
        }));
    }
    let mut associations = Vec::new();
    for id in store.associations() {
        let snapshot = store.snapshot(id)?;
        let SnapshotBody::Association {
            typing,
            themes,
            reifier,
            roles,
        } = &snapshot.body
        else {
            continue;
        };
        let mut role_values = Vec::new();
        for role in roles {
            let role_snapshot = store.snapshot(*role)?;
            let SnapshotBody::Role {
                typing,
                player,
                reifier,
            } = &role_snapshot.body
            else {
                continue;
            };
            role_values.push(json!({
                "type": topic_ref(store, *typing)?,
                "player": topic_ref(store, *player)?,
                "reifier": reifier_ref(store, *reifier)?,
            }));
        }
        associations.push(json!({
            "type": topic_ref(store, *typing)?,
            "scope": scope_refs(store, themes)?,
            "roles": role_values,
            "reifier": reifier_ref(store, *reifier)?,
        }));
    }
    Ok(json!({
        "version": "1.0",
        "item_type": "topicmap",
        "topics": topics,
        "associations": associations,
    }))
}
