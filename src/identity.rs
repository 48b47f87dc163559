//! The identity engine: the locator -> construct maps and the merge rules
//! that keep "same subject, same topic" true as data is added.
//!
//! Merging never rejects: a subject-identifier or subject-locator collision
//! absorbs one topic into the other. The absorbed id is redirected to the
//! survivor, transitively and idempotently, so stale ids and old locators
//! keep resolving after any number of merges.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::construct::{Body, OtherHasher, Tid, TidHasher, sorted_ids};
use crate::database::Database;
use crate::error::{Result, TopikaError};
use crate::locator::Locator;
use crate::store::{ChangeKind, Datum};

// ------------- IdentityIndex -------------
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_subject_identifier: HashMap<Arc<Locator>, Tid, OtherHasher>,
    by_subject_locator: HashMap<Arc<Locator>, Tid, OtherHasher>,
    by_item_identifier: HashMap<Arc<Locator>, Tid, OtherHasher>,
    // absorbed id -> survivor, path-compressed on every merge
    redirects: HashMap<Tid, Tid, TidHasher>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }
    /// Follow merge redirects until the surviving id is reached.
    pub fn resolve(&self, id: Tid) -> Tid {
        let mut current = id;
        while let Some(next) = self.redirects.get(&current) {
            current = *next;
        }
        current
    }
    /// Record that `loser` was absorbed into `survivor`. Existing redirects
    /// pointing at the loser are rewritten so resolution stays one hop.
    pub fn redirect(&mut self, loser: Tid, survivor: Tid) {
        for target in self.redirects.values_mut() {
            if *target == loser {
                *target = survivor;
            }
        }
        self.redirects.insert(loser, survivor);
    }
    pub fn topic_by_subject_identifier(&self, locator: &Arc<Locator>) -> Option<Tid> {
        self.by_subject_identifier
            .get(locator)
            .map(|id| self.resolve(*id))
    }
    pub fn topic_by_subject_locator(&self, locator: &Arc<Locator>) -> Option<Tid> {
        self.by_subject_locator
            .get(locator)
            .map(|id| self.resolve(*id))
    }
    pub fn construct_by_item_identifier(&self, locator: &Arc<Locator>) -> Option<Tid> {
        self.by_item_identifier
            .get(locator)
            .map(|id| self.resolve(*id))
    }
    pub fn record_subject_identifier(&mut self, locator: Arc<Locator>, topic: Tid) {
        self.by_subject_identifier.insert(locator, topic);
    }
    pub fn record_subject_locator(&mut self, locator: Arc<Locator>, topic: Tid) {
        self.by_subject_locator.insert(locator, topic);
    }
    pub fn record_item_identifier(&mut self, locator: Arc<Locator>, construct: Tid) {
        self.by_item_identifier.insert(locator, construct);
    }
    pub fn erase_subject_identifier(&mut self, locator: &Arc<Locator>) {
        self.by_subject_identifier.remove(locator);
    }
    pub fn erase_subject_locator(&mut self, locator: &Arc<Locator>) {
        self.by_subject_locator.remove(locator);
    }
    pub fn erase_item_identifier(&mut self, locator: &Arc<Locator>) {
        self.by_item_identifier.remove(locator);
    }
}

// ------------- the merge engine -------------
impl Database {
    /// Unify two topics into one. The topic with the smaller id survives;
    /// the other is removed and its id redirected. The survivor ends up
    /// carrying the union of both topics' identifiers, types, supertypes,
    /// characteristics, played roles and reification, and every scope that
    /// used the absorbed topic as a theme is rewritten (and consolidated
    /// where rewriting makes scopes structurally identical).
    pub(crate) fn merge_topics(&mut self, a: Tid, b: Tid) -> Result<Tid> {
        let a = self.expect_topic(a)?;
        let b = self.expect_topic(b)?;
        if a == b {
            return Ok(a);
        }
        let (survivor, loser) = if a < b { (a, b) } else { (b, a) };
        let survivor_reified = self.arena.get(survivor)?.topic()?.reified;
        let loser_reified = self.arena.get(loser)?.topic()?.reified;
        if let (Some(x), Some(y)) = (survivor_reified, loser_reified) {
            if x != y {
                return Err(TopikaError::Constraint(format!(
                    "topics {survivor} and {loser} reify different constructs"
                )));
            }
        }
        debug!(survivor, loser, "merging topics");

        // lift everything the loser carries out of the arena in one pass
        let (iis, sis, sls, types, supertypes, names, occurrences, roles) = {
            let body = self.arena.get(loser)?;
            let iis: Vec<Arc<Locator>> = body.item_identifiers.iter().map(Arc::clone).collect();
            let topic = body.topic()?;
            (
                iis,
                topic
                    .subject_identifiers
                    .iter()
                    .map(Arc::clone)
                    .collect::<Vec<_>>(),
                topic
                    .subject_locators
                    .iter()
                    .map(Arc::clone)
                    .collect::<Vec<_>>(),
                sorted_ids(&topic.types),
                sorted_ids(&topic.supertypes),
                sorted_ids(&topic.names),
                sorted_ids(&topic.occurrences),
                sorted_ids(&topic.roles_played),
            )
        };

        // identifiers: union into the survivor, maps rebound as we go
        for locator in &sis {
            self.identity
                .record_subject_identifier(Arc::clone(locator), survivor);
        }
        for locator in &sls {
            self.identity
                .record_subject_locator(Arc::clone(locator), survivor);
        }
        for locator in &iis {
            self.identity
                .record_item_identifier(Arc::clone(locator), survivor);
        }
        {
            let body = self.arena.get_mut(survivor)?;
            body.item_identifiers.extend(iis.iter().map(Arc::clone));
            let topic = body.topic_mut()?;
            topic.subject_identifiers.extend(sis.iter().map(Arc::clone));
            topic.subject_locators.extend(sls.iter().map(Arc::clone));
            topic.types.extend(types.iter().copied());
            topic.supertypes.extend(supertypes.iter().copied());
            topic.names.extend(names.iter().copied());
            topic.occurrences.extend(occurrences.iter().copied());
            topic.roles_played.extend(roles.iter().copied());
        }

        // other topics referencing the loser as type or supertype
        let mut retyped: Vec<(Tid, bool)> = Vec::new();
        for construct in self.arena.iter() {
            if construct.id == loser {
                continue;
            }
            if let Body::Topic(topic) = &construct.body {
                if topic.types.contains(&loser) {
                    retyped.push((construct.id, false));
                }
                if topic.supertypes.contains(&loser) {
                    retyped.push((construct.id, true));
                }
            }
        }
        for (other, supertype) in retyped {
            let topic = self.arena.get_mut(other)?.topic_mut()?;
            if supertype {
                topic.supertypes.remove(&loser);
                topic.supertypes.insert(survivor);
            } else {
                topic.types.remove(&loser);
                topic.types.insert(survivor);
            }
        }

        // typed constructs pointing at the loser
        let typed: Vec<Tid> = self
            .by_type
            .remove(&loser)
            .map(|set| set.iter().collect())
            .unwrap_or_default();
        for id in &typed {
            self.arena.get_mut(*id)?.body.set_typing(survivor)?;
            self.by_type.entry(survivor).or_default().insert(*id);
        }

        // characteristics reparent, role players redirect
        for id in names.iter().chain(occurrences.iter()) {
            self.arena.get_mut(*id)?.parent = Some(survivor);
        }
        for role in &roles {
            if let Body::Role(body) = &mut self.arena.get_mut(*role)?.body {
                body.player = survivor;
            }
        }

        // reification: the survivor takes over the loser's link
        if let Some(reified) = loser_reified {
            self.arena.get_mut(survivor)?.topic_mut()?.reified = Some(reified);
            self.arena.get_mut(reified)?.body.set_reifier(Some(survivor))?;
        }

        // theme substitution, cascading scope consolidation included
        let remap = self.scopes.substitute_theme(loser, Some(survivor));
        self.repoint_scopes(remap)?;

        // the loser stops existing; its id keeps answering
        self.identity.redirect(loser, survivor);
        self.arena.remove(loser)?;
        if let Some(p) = self.persistor.as_mut() {
            p.persist_merge(loser, survivor)?;
        }
        self.notify(
            ChangeKind::Merged,
            survivor,
            Datum::Id(survivor),
            Datum::Id(loser),
        );
        Ok(survivor)
    }

    /// Coalesce names on one topic that share type, value and scope. The
    /// name with the smallest id survives; item identifiers and variants of
    /// the duplicates move over to it. Only ever runs when explicitly asked
    /// for, never as a side effect of a write.
    pub(crate) fn remove_duplicate_names(&mut self, topic: Tid) -> Result<usize> {
        let names = {
            let body = self.arena.get(topic)?.topic()?;
            sorted_ids(&body.names)
        };
        let mut keepers: HashMap<(Tid, String, u64), Tid, OtherHasher> = HashMap::default();
        let mut coalesced = 0usize;
        for name in names {
            let key = match &self.arena.get(name)?.body {
                Body::Name(b) => (
                    self.identity.resolve(b.typing),
                    b.value.clone(),
                    b.scope.sid(),
                ),
                _ => continue,
            };
            let Some(keeper) = keepers.get(&key).copied() else {
                keepers.insert(key, name);
                continue;
            };
            // move item identifiers across before the duplicate goes away
            let moved: Vec<Arc<Locator>> = {
                let dup = self.arena.get_mut(name)?;
                dup.item_identifiers.drain().collect()
            };
            for locator in moved {
                self.identity
                    .record_item_identifier(Arc::clone(&locator), keeper);
                self.arena
                    .get_mut(keeper)?
                    .item_identifiers
                    .insert(Arc::clone(&locator));
                if let Some(p) = self.persistor.as_mut() {
                    p.persist_identifier(locator.cid(), keeper, "ii")?;
                }
            }
            let variants = match &self.arena.get(name)?.body {
                Body::Name(b) => sorted_ids(&b.variants),
                _ => Vec::new(),
            };
            for variant in &variants {
                self.arena.get_mut(*variant)?.parent = Some(keeper);
                if let Body::Name(b) = &mut self.arena.get_mut(keeper)?.body {
                    b.variants.insert(*variant);
                }
                self.persist_full(*variant)?;
            }
            if let Body::Name(b) = &mut self.arena.get_mut(name)?.body {
                b.variants.clear();
            }
            self.remove_construct(name)?;
            coalesced += 1;
        }
        Ok(coalesced)
    }
}
