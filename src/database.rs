//! The store: one explicit context value owning the arena, the keepers and
//! the indexes, wired to an optional write-through persistor. There is no
//! ambient global state; everything an operation needs is a field here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use roaring::RoaringTreemap;
use tracing::{debug, info};

use crate::construct::{
    Arena, AssociationBody, Body, Construct, ConstructSnapshot, Kind, NameBody, OccurrenceBody,
    RoleBody, ScopeRef, SnapshotBody, ThemeSet, Tid, TidHasher, TopicBody, TopicMapBody,
    VariantBody, sorted_ids, sorted_references, sorted_themes,
};
use crate::datatype::{Literal, xsd};
use crate::error::{Result, TopikaError};
use crate::identity::IdentityIndex;
use crate::locator::{Locator, LocatorKeeper};
use crate::persist::{ConstructRow, Persistor};
use crate::scope::ScopeKeeper;
use crate::store::{
    Applied, Change, ChangeKind, Datum, Listener, ListenerId, Operation, Store, TopicSeed,
};

/// The default name type, created on demand when a name is given no type.
pub const TOPIC_NAME_TYPE: &str = "http://psi.topicmaps.org/iso13250/model/topic-name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

// ------------- Database -------------
pub struct Database {
    pub(crate) arena: Arena,
    pub(crate) topic_map: Tid,
    pub(crate) locators: LocatorKeeper,
    pub(crate) identity: IdentityIndex,
    pub(crate) scopes: ScopeKeeper,
    // typed constructs per type topic
    pub(crate) by_type: HashMap<Tid, RoaringTreemap, TidHasher>,
    // scoped constructs per scope sid (the unconstrained scope is not indexed)
    pub(crate) by_scope: HashMap<u64, RoaringTreemap, TidHasher>,
    pub(crate) listeners: Vec<(ListenerId, Arc<dyn Listener>)>,
    next_listener: ListenerId,
    pub(crate) persistor: Option<Persistor>,
    default_name_type: Option<Tid>,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Database> {
        let persistor = match mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => Some(Persistor::open(&path)?),
        };
        let mut db = Database {
            arena: Arena::new(),
            topic_map: 0,
            locators: LocatorKeeper::new(),
            identity: IdentityIndex::new(),
            scopes: ScopeKeeper::new(),
            by_type: HashMap::default(),
            by_scope: HashMap::default(),
            listeners: Vec::new(),
            next_listener: 0,
            persistor,
            default_name_type: None,
        };
        let fresh = match db.persistor.as_mut() {
            Some(p) => p.is_empty()?,
            None => true,
        };
        if fresh {
            db.topic_map = db
                .arena
                .insert(None, Body::TopicMap(TopicMapBody::default()));
            db.persist_full(db.topic_map)?;
        } else {
            db.restore()?;
            info!(
                constructs = db.arena.len(),
                locators = db.locators.len(),
                "restored topic map"
            );
        }
        Ok(db)
    }

    // ------------- dereferencing -------------
    pub(crate) fn deref(&self, id: Tid) -> Result<&Construct> {
        self.arena.get(self.identity.resolve(id))
    }
    pub(crate) fn deref_mut(&mut self, id: Tid) -> Result<&mut Construct> {
        let resolved = self.identity.resolve(id);
        self.arena.get_mut(resolved)
    }
    /// Resolve an id expected to name a live topic.
    pub(crate) fn expect_topic(&self, id: Tid) -> Result<Tid> {
        let construct = self.deref(id)?;
        match construct.kind() {
            Kind::Topic => Ok(construct.id),
            other => Err(TopikaError::Constraint(format!(
                "construct {id} is a {other}, expected a topic"
            ))),
        }
    }
    fn expect_map(&self, map: Tid) -> Result<()> {
        if self.identity.resolve(map) != self.topic_map {
            return Err(TopikaError::Constraint(format!(
                "construct {map} does not name this topic map"
            )));
        }
        Ok(())
    }
    fn resolve_topics(&self, ids: &[Tid]) -> Result<ThemeSet> {
        let mut set = ThemeSet::new();
        for id in ids {
            set.insert(self.expect_topic(*id)?);
        }
        Ok(set)
    }

    // ------------- notifications -------------
    pub(crate) fn notify(&self, kind: ChangeKind, notifier: Tid, new: Datum, old: Datum) {
        let change = Change {
            kind,
            notifier,
            new,
            old,
        };
        for (_, listener) in &self.listeners {
            listener.notify(&change);
        }
    }

    // ------------- index maintenance -------------
    pub(crate) fn index_typed(&mut self, id: Tid, typing: Tid) {
        self.by_type.entry(typing).or_default().insert(id);
    }
    fn unindex_typed(&mut self, id: Tid, typing: Tid) {
        if let Some(set) = self.by_type.get_mut(&typing) {
            set.remove(id);
            if set.is_empty() {
                self.by_type.remove(&typing);
            }
        }
    }
    pub(crate) fn index_scoped(&mut self, id: Tid, scope: &ScopeRef) {
        if !scope.is_unconstrained() {
            self.by_scope.entry(scope.sid()).or_default().insert(id);
        }
    }
    pub(crate) fn unindex_scoped(&mut self, id: Tid, scope: &ScopeRef) {
        if let Some(set) = self.by_scope.get_mut(&scope.sid()) {
            set.remove(id);
            if set.is_empty() {
                self.by_scope.remove(&scope.sid());
            }
        }
    }

    // ------------- persistence write-through -------------
    fn construct_row(&self, id: Tid) -> Result<ConstructRow> {
        let c = self.arena.get(id)?;
        let (typing, player, value, datatype, reifier) = match &c.body {
            Body::TopicMap(b) => (None, None, None, None, b.reifier),
            // the reified link is derived from the reifier column on restore
            Body::Topic(_) => (None, None, None, None, None),
            Body::Association(b) => (Some(b.typing), None, None, None, b.reifier),
            Body::Role(b) => (Some(b.typing), Some(b.player), None, None, b.reifier),
            Body::Name(b) => (Some(b.typing), None, Some(b.value.clone()), None, b.reifier),
            Body::Occurrence(b) => (
                Some(b.typing),
                None,
                Some(b.literal.value().to_owned()),
                Some(b.literal.datatype().to_owned()),
                b.reifier,
            ),
            Body::Variant(b) => (
                None,
                None,
                Some(b.literal.value().to_owned()),
                Some(b.literal.datatype().to_owned()),
                b.reifier,
            ),
        };
        Ok(ConstructRow {
            id,
            kind: c.kind().as_str().to_owned(),
            parent: c.parent,
            typing,
            player,
            value,
            datatype,
            reifier,
        })
    }
    pub(crate) fn persist_full(&mut self, id: Tid) -> Result<()> {
        if self.persistor.is_none() {
            return Ok(());
        }
        let row = self.construct_row(id)?;
        let themes: Vec<Tid> = self
            .arena
            .get(id)?
            .body
            .scope()
            .map(|s| sorted_themes(s))
            .unwrap_or_default();
        let persistor = self.persistor.as_mut().unwrap();
        persistor.persist_construct(&row)?;
        persistor.replace_themes(id, &themes)?;
        Ok(())
    }
    fn persist_identifier(&mut self, locator_cid: u64, reference: &str, id: Tid, kind: &'static str) -> Result<()> {
        if let Some(p) = self.persistor.as_mut() {
            p.persist_locator(locator_cid, reference)?;
            p.persist_identifier(locator_cid, id, kind)?;
        }
        Ok(())
    }
    fn delete_identifier(&mut self, locator_cid: u64, kind: &'static str) -> Result<()> {
        if let Some(p) = self.persistor.as_mut() {
            p.delete_identifier(locator_cid, kind)?;
        }
        Ok(())
    }

    // ------------- topic creation -------------
    fn create_topic_bare(&mut self) -> Result<Tid> {
        let id = self
            .arena
            .insert(Some(self.topic_map), Body::Topic(TopicBody::default()));
        self.persist_full(id)?;
        Ok(id)
    }
    /// A topic carrying the given subject identifier, created or adopted.
    pub(crate) fn topic_with_subject_identifier(&mut self, iri: &str) -> Result<Tid> {
        let (locator, _) = self.locators.keep(iri)?;
        if let Some(existing) = self.identity.topic_by_subject_identifier(&locator) {
            return Ok(existing);
        }
        let id = self.create_topic_bare()?;
        self.deref_mut(id)?
            .topic_mut()?
            .subject_identifiers
            .insert(Arc::clone(&locator));
        self.identity.record_subject_identifier(Arc::clone(&locator), id);
        self.persist_identifier(locator.cid(), locator.reference(), id, "si")?;
        self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
        Ok(id)
    }
    pub(crate) fn default_name_type(&mut self) -> Result<Tid> {
        if let Some(cached) = self.default_name_type {
            let resolved = self.identity.resolve(cached);
            if self.arena.contains(resolved) {
                return Ok(resolved);
            }
        }
        let id = self.topic_with_subject_identifier(TOPIC_NAME_TYPE)?;
        self.default_name_type = Some(id);
        Ok(id)
    }

    fn create_topic(&mut self, seed: TopicSeed) -> Result<Applied> {
        match seed {
            TopicSeed::None => {
                let id = self.create_topic_bare()?;
                self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
                Ok(Applied::created(id))
            }
            TopicSeed::SubjectIdentifier(iri) => {
                let (locator, _) = self.locators.keep(&iri)?;
                if let Some(existing) = self.identity.topic_by_subject_identifier(&locator) {
                    return Ok(Applied::created(existing));
                }
                // a topic already carrying the IRI as an item identifier is
                // the same subject; unify instead of creating a duplicate
                if let Some(existing) = self.identity.construct_by_item_identifier(&locator) {
                    if self.deref(existing)?.kind() == Kind::Topic {
                        self.deref_mut(existing)?
                            .topic_mut()?
                            .subject_identifiers
                            .insert(Arc::clone(&locator));
                        self.identity
                            .record_subject_identifier(Arc::clone(&locator), existing);
                        self.persist_identifier(locator.cid(), locator.reference(), existing, "si")?;
                        self.notify(
                            ChangeKind::IdentityAdded,
                            existing,
                            Datum::Iri(locator.reference().to_owned()),
                            Datum::None,
                        );
                        return Ok(Applied::created(existing));
                    }
                }
                let id = self.create_topic_bare()?;
                self.deref_mut(id)?
                    .topic_mut()?
                    .subject_identifiers
                    .insert(Arc::clone(&locator));
                self.identity.record_subject_identifier(Arc::clone(&locator), id);
                self.persist_identifier(locator.cid(), locator.reference(), id, "si")?;
                self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
                Ok(Applied::created(id))
            }
            TopicSeed::SubjectLocator(iri) => {
                let (locator, _) = self.locators.keep(&iri)?;
                if let Some(existing) = self.identity.topic_by_subject_locator(&locator) {
                    return Ok(Applied::created(existing));
                }
                let id = self.create_topic_bare()?;
                self.deref_mut(id)?
                    .topic_mut()?
                    .subject_locators
                    .insert(Arc::clone(&locator));
                self.identity.record_subject_locator(Arc::clone(&locator), id);
                self.persist_identifier(locator.cid(), locator.reference(), id, "sl")?;
                self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
                Ok(Applied::created(id))
            }
            TopicSeed::ItemIdentifier(iri) => {
                let (locator, _) = self.locators.keep(&iri)?;
                if let Some(existing) = self.identity.construct_by_item_identifier(&locator) {
                    // a colliding topic is the same subject and is adopted;
                    // any other construct kind is an identity error
                    return match self.deref(existing)?.kind() {
                        Kind::Topic => Ok(Applied::created(existing)),
                        other => Err(TopikaError::Identity(format!(
                            "item identifier '{}' is already bound to a {other}",
                            locator.reference()
                        ))),
                    };
                }
                if let Some(existing) = self.identity.topic_by_subject_identifier(&locator) {
                    self.deref_mut(existing)?
                        .item_identifiers
                        .insert(Arc::clone(&locator));
                    self.identity
                        .record_item_identifier(Arc::clone(&locator), existing);
                    self.persist_identifier(locator.cid(), locator.reference(), existing, "ii")?;
                    self.notify(
                        ChangeKind::IdentityAdded,
                        existing,
                        Datum::Iri(locator.reference().to_owned()),
                        Datum::None,
                    );
                    return Ok(Applied::created(existing));
                }
                let id = self.create_topic_bare()?;
                self.deref_mut(id)?
                    .item_identifiers
                    .insert(Arc::clone(&locator));
                self.identity.record_item_identifier(Arc::clone(&locator), id);
                self.persist_identifier(locator.cid(), locator.reference(), id, "ii")?;
                self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
                Ok(Applied::created(id))
            }
        }
    }

    // ------------- scoped/typed creation -------------
    fn create_association(&mut self, map: Tid, typing: Tid, themes: &[Tid]) -> Result<Applied> {
        self.expect_map(map)?;
        let typing = self.expect_topic(typing)?;
        let theme_set = self.resolve_topics(themes)?;
        let (scope, _) = self.scopes.scope_of(theme_set);
        let id = self.arena.insert(
            Some(self.topic_map),
            Body::Association(AssociationBody {
                typing,
                scope: Arc::clone(&scope),
                reifier: None,
                roles: Default::default(),
            }),
        );
        self.index_typed(id, typing);
        self.index_scoped(id, &scope);
        self.persist_full(id)?;
        self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
        Ok(Applied::created(id))
    }
    fn create_role(&mut self, association: Tid, typing: Tid, player: Tid) -> Result<Applied> {
        let association = self.identity.resolve(association);
        if self.deref(association)?.kind() != Kind::Association {
            return Err(TopikaError::Constraint(format!(
                "construct {association} is not an association"
            )));
        }
        let typing = self.expect_topic(typing)?;
        let player = self.expect_topic(player)?;
        let id = self.arena.insert(
            Some(association),
            Body::Role(RoleBody {
                typing,
                player,
                reifier: None,
            }),
        );
        if let Body::Association(b) = &mut self.arena.get_mut(association)?.body {
            b.roles.insert(id);
        }
        self.deref_mut(player)?.topic_mut()?.roles_played.insert(id);
        self.index_typed(id, typing);
        self.persist_full(id)?;
        self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
        Ok(Applied::created(id))
    }
    fn create_name(
        &mut self,
        topic: Tid,
        typing: Option<Tid>,
        value: String,
        themes: &[Tid],
    ) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let typing = match typing {
            Some(t) => self.expect_topic(t)?,
            None => self.default_name_type()?,
        };
        let theme_set = self.resolve_topics(themes)?;
        let (scope, _) = self.scopes.scope_of(theme_set);
        let id = self.arena.insert(
            Some(topic),
            Body::Name(NameBody {
                typing,
                value,
                scope: Arc::clone(&scope),
                reifier: None,
                variants: Default::default(),
            }),
        );
        self.deref_mut(topic)?.topic_mut()?.names.insert(id);
        self.index_typed(id, typing);
        self.index_scoped(id, &scope);
        self.persist_full(id)?;
        self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
        Ok(Applied::created(id))
    }
    fn create_occurrence(
        &mut self,
        topic: Tid,
        typing: Tid,
        literal: Literal,
        themes: &[Tid],
    ) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let typing = self.expect_topic(typing)?;
        let theme_set = self.resolve_topics(themes)?;
        let (scope, _) = self.scopes.scope_of(theme_set);
        let id = self.arena.insert(
            Some(topic),
            Body::Occurrence(OccurrenceBody {
                typing,
                literal,
                scope: Arc::clone(&scope),
                reifier: None,
            }),
        );
        self.deref_mut(topic)?.topic_mut()?.occurrences.insert(id);
        self.index_typed(id, typing);
        self.index_scoped(id, &scope);
        self.persist_full(id)?;
        self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
        Ok(Applied::created(id))
    }
    fn create_variant(&mut self, name: Tid, literal: Literal, themes: &[Tid]) -> Result<Applied> {
        let name = self.identity.resolve(name);
        let theme_set = self.resolve_topics(themes)?;
        let parent_scope = match &self.arena.get(name)?.body {
            Body::Name(b) => Arc::clone(&b.scope),
            _ => {
                return Err(TopikaError::Constraint(format!(
                    "construct {name} is not a name"
                )));
            }
        };
        // a variant must be distinguishable from its parent name
        if !theme_set.iter().any(|t| !parent_scope.contains(*t)) {
            return Err(TopikaError::Constraint(
                "variant scope adds no theme beyond its parent name's scope".to_owned(),
            ));
        }
        let (scope, _) = self.scopes.scope_of(theme_set);
        let id = self.arena.insert(
            Some(name),
            Body::Variant(VariantBody {
                literal,
                scope: Arc::clone(&scope),
                reifier: None,
            }),
        );
        if let Body::Name(b) = &mut self.arena.get_mut(name)?.body {
            b.variants.insert(id);
        }
        self.index_scoped(id, &scope);
        self.persist_full(id)?;
        self.notify(ChangeKind::Created, id, Datum::Id(id), Datum::None);
        Ok(Applied::created(id))
    }

    // ------------- identity operations -------------
    fn add_subject_identifier(&mut self, topic: Tid, iri: &str) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let (locator, _) = self.locators.keep(iri)?;
        let notifier = match self.identity.topic_by_subject_identifier(&locator) {
            Some(other) if other == topic => return Ok(Applied::none()),
            Some(other) => self.merge_topics(topic, other)?,
            None => {
                self.deref_mut(topic)?
                    .topic_mut()?
                    .subject_identifiers
                    .insert(Arc::clone(&locator));
                self.identity
                    .record_subject_identifier(Arc::clone(&locator), topic);
                self.persist_identifier(locator.cid(), locator.reference(), topic, "si")?;
                topic
            }
        };
        self.notify(
            ChangeKind::IdentityAdded,
            notifier,
            Datum::Iri(locator.reference().to_owned()),
            Datum::None,
        );
        Ok(Applied::none())
    }
    fn remove_subject_identifier(&mut self, topic: Tid, iri: &str) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let Some(locator) = self.locators.get(iri) else {
            return Ok(Applied::none());
        };
        if !self
            .deref_mut(topic)?
            .topic_mut()?
            .subject_identifiers
            .remove(&locator)
        {
            return Ok(Applied::none());
        }
        self.identity.erase_subject_identifier(&locator);
        self.delete_identifier(locator.cid(), "si")?;
        self.notify(
            ChangeKind::IdentityRemoved,
            topic,
            Datum::None,
            Datum::Iri(locator.reference().to_owned()),
        );
        Ok(Applied::none())
    }
    fn add_subject_locator(&mut self, topic: Tid, iri: &str) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let (locator, _) = self.locators.keep(iri)?;
        let notifier = match self.identity.topic_by_subject_locator(&locator) {
            Some(other) if other == topic => return Ok(Applied::none()),
            Some(other) => self.merge_topics(topic, other)?,
            None => {
                self.deref_mut(topic)?
                    .topic_mut()?
                    .subject_locators
                    .insert(Arc::clone(&locator));
                self.identity
                    .record_subject_locator(Arc::clone(&locator), topic);
                self.persist_identifier(locator.cid(), locator.reference(), topic, "sl")?;
                topic
            }
        };
        self.notify(
            ChangeKind::IdentityAdded,
            notifier,
            Datum::Iri(locator.reference().to_owned()),
            Datum::None,
        );
        Ok(Applied::none())
    }
    fn remove_subject_locator(&mut self, topic: Tid, iri: &str) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let Some(locator) = self.locators.get(iri) else {
            return Ok(Applied::none());
        };
        if !self
            .deref_mut(topic)?
            .topic_mut()?
            .subject_locators
            .remove(&locator)
        {
            return Ok(Applied::none());
        }
        self.identity.erase_subject_locator(&locator);
        self.delete_identifier(locator.cid(), "sl")?;
        self.notify(
            ChangeKind::IdentityRemoved,
            topic,
            Datum::None,
            Datum::Iri(locator.reference().to_owned()),
        );
        Ok(Applied::none())
    }
    fn add_item_identifier(&mut self, construct: Tid, iri: &str) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        let kind = self.deref(construct)?.kind();
        let (locator, _) = self.locators.keep(iri)?;
        let notifier = match self.identity.construct_by_item_identifier(&locator) {
            Some(other) if other == construct => return Ok(Applied::none()),
            Some(other) => {
                let other_kind = self.deref(other)?.kind();
                if kind == Kind::Topic && other_kind == Kind::Topic {
                    self.merge_topics(construct, other)?
                } else {
                    return Err(TopikaError::Identity(format!(
                        "item identifier '{}' is already bound to a {other_kind}",
                        locator.reference()
                    )));
                }
            }
            None => {
                self.deref_mut(construct)?
                    .item_identifiers
                    .insert(Arc::clone(&locator));
                self.identity
                    .record_item_identifier(Arc::clone(&locator), construct);
                self.persist_identifier(locator.cid(), locator.reference(), construct, "ii")?;
                construct
            }
        };
        self.notify(
            ChangeKind::IdentityAdded,
            notifier,
            Datum::Iri(locator.reference().to_owned()),
            Datum::None,
        );
        Ok(Applied::none())
    }
    fn remove_item_identifier(&mut self, construct: Tid, iri: &str) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        self.deref(construct)?;
        let Some(locator) = self.locators.get(iri) else {
            return Ok(Applied::none());
        };
        if !self.deref_mut(construct)?.item_identifiers.remove(&locator) {
            return Ok(Applied::none());
        }
        self.identity.erase_item_identifier(&locator);
        self.delete_identifier(locator.cid(), "ii")?;
        self.notify(
            ChangeKind::IdentityRemoved,
            construct,
            Datum::None,
            Datum::Iri(locator.reference().to_owned()),
        );
        Ok(Applied::none())
    }

    // ------------- typing operations -------------
    fn add_topic_ref(
        &mut self,
        topic: Tid,
        other: Tid,
        supertype: bool,
        kind: ChangeKind,
    ) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let other = self.expect_topic(other)?;
        let body = self.deref_mut(topic)?.topic_mut()?;
        let inserted = if supertype {
            body.supertypes.insert(other)
        } else {
            body.types.insert(other)
        };
        if !inserted {
            return Ok(Applied::none());
        }
        if let Some(p) = self.persistor.as_mut() {
            p.persist_topic_type(topic, other, if supertype { "supertype" } else { "type" })?;
        }
        self.notify(kind, topic, Datum::Id(other), Datum::None);
        Ok(Applied::none())
    }
    fn remove_topic_ref(
        &mut self,
        topic: Tid,
        other: Tid,
        supertype: bool,
        kind: ChangeKind,
    ) -> Result<Applied> {
        let topic = self.expect_topic(topic)?;
        let other = self.identity.resolve(other);
        let body = self.deref_mut(topic)?.topic_mut()?;
        let removed = if supertype {
            body.supertypes.remove(&other)
        } else {
            body.types.remove(&other)
        };
        if !removed {
            return Ok(Applied::none());
        }
        if let Some(p) = self.persistor.as_mut() {
            p.delete_topic_type(topic, other, if supertype { "supertype" } else { "type" })?;
        }
        self.notify(kind, topic, Datum::None, Datum::Id(other));
        Ok(Applied::none())
    }
    fn set_type(&mut self, construct: Tid, typing: Tid) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        let typing = self.expect_topic(typing)?;
        let old = self
            .deref(construct)?
            .body
            .typing()
            .ok_or_else(|| TopikaError::Constraint(format!("construct {construct} is not typed")))?;
        if old == typing {
            return Ok(Applied::none());
        }
        self.deref_mut(construct)?.body.set_typing(typing)?;
        self.unindex_typed(construct, old);
        self.index_typed(construct, typing);
        self.persist_full(construct)?;
        self.notify(
            ChangeKind::TypeChanged,
            construct,
            Datum::Id(typing),
            Datum::Id(old),
        );
        Ok(Applied::none())
    }

    // ------------- value and player operations -------------
    fn set_value(&mut self, construct: Tid, literal: Literal) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        let old = match &mut self.arena.get_mut(construct)?.body {
            Body::Name(b) => {
                if literal.datatype() != xsd::STRING {
                    return Err(TopikaError::Constraint(
                        "a name value is always a string".to_owned(),
                    ));
                }
                let old = Literal::string(b.value.clone());
                b.value = literal.value().to_owned();
                old
            }
            Body::Occurrence(b) => std::mem::replace(&mut b.literal, literal.clone()),
            Body::Variant(b) => std::mem::replace(&mut b.literal, literal.clone()),
            _ => {
                return Err(TopikaError::Constraint(format!(
                    "construct {construct} carries no value"
                )));
            }
        };
        self.persist_full(construct)?;
        self.notify(
            ChangeKind::ValueChanged,
            construct,
            Datum::Value(literal),
            Datum::Value(old),
        );
        Ok(Applied::none())
    }
    fn set_player(&mut self, role: Tid, player: Tid) -> Result<Applied> {
        let role = self.identity.resolve(role);
        let player = self.expect_topic(player)?;
        let old = match &self.arena.get(role)?.body {
            Body::Role(b) => b.player,
            _ => {
                return Err(TopikaError::Constraint(format!(
                    "construct {role} is not a role"
                )));
            }
        };
        if old == player {
            return Ok(Applied::none());
        }
        self.deref_mut(old)?.topic_mut()?.roles_played.remove(&role);
        self.deref_mut(player)?.topic_mut()?.roles_played.insert(role);
        if let Body::Role(b) = &mut self.arena.get_mut(role)?.body {
            b.player = player;
        }
        self.persist_full(role)?;
        self.notify(
            ChangeKind::PlayerChanged,
            role,
            Datum::Id(player),
            Datum::Id(old),
        );
        Ok(Applied::none())
    }

    // ------------- reification -------------
    fn set_reifier(&mut self, construct: Tid, reifier: Option<Tid>) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        let old = self.deref(construct)?.body.reifier();
        let reifier = reifier.map(|r| self.expect_topic(r)).transpose()?;
        if old == reifier {
            return Ok(Applied::none());
        }
        if let Some(r) = reifier {
            if let Some(reified) = self.deref(r)?.topic()?.reified {
                if reified != construct {
                    return Err(TopikaError::Constraint(format!(
                        "topic {r} already reifies construct {reified}"
                    )));
                }
            }
        }
        if let Some(previous) = old {
            self.deref_mut(previous)?.topic_mut()?.reified = None;
        }
        if let Some(r) = reifier {
            self.deref_mut(r)?.topic_mut()?.reified = Some(construct);
        }
        self.deref_mut(construct)?.body.set_reifier(reifier)?;
        self.persist_full(construct)?;
        self.notify(
            ChangeKind::ReifierChanged,
            construct,
            reifier.map(Datum::Id).unwrap_or(Datum::None),
            old.map(Datum::Id).unwrap_or(Datum::None),
        );
        Ok(Applied::none())
    }

    // ------------- scope operations -------------
    fn reshape_scope(&mut self, construct: Tid, theme: Tid, add: bool) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        let theme = self.expect_topic(theme)?;
        let old_scope = self
            .deref(construct)?
            .body
            .scope()
            .cloned()
            .ok_or_else(|| {
                TopikaError::Constraint(format!("construct {construct} is not scoped"))
            })?;
        let mut themes = old_scope.themes().clone();
        let changed = if add {
            themes.insert(theme)
        } else {
            themes.remove(&theme)
        };
        if !changed {
            return Ok(Applied::none());
        }
        // a variant may never become indistinguishable from its parent name
        if let Body::Variant(_) = &self.arena.get(construct)?.body {
            let parent = self.arena.get(construct)?.parent.ok_or_else(|| {
                TopikaError::Invariant(format!("variant {construct} has no parent name"))
            })?;
            let parent_scope = match &self.arena.get(parent)?.body {
                Body::Name(b) => Arc::clone(&b.scope),
                _ => {
                    return Err(TopikaError::Invariant(format!(
                        "variant {construct} has no parent name"
                    )));
                }
            };
            if !themes.iter().any(|t| !parent_scope.contains(*t)) {
                return Err(TopikaError::Constraint(
                    "variant scope adds no theme beyond its parent name's scope".to_owned(),
                ));
            }
        }
        let (new_scope, _) = self.scopes.scope_of(themes);
        self.unindex_scoped(construct, &old_scope);
        self.index_scoped(construct, &new_scope);
        self.deref_mut(construct)?
            .body
            .set_scope(Arc::clone(&new_scope))?;
        self.persist_full(construct)?;
        self.notify(
            ChangeKind::ScopeChanged,
            construct,
            Datum::Themes(sorted_themes(&new_scope)),
            Datum::Themes(sorted_themes(&old_scope)),
        );
        Ok(Applied::none())
    }

    // ------------- removal -------------
    fn topic_in_use(&self, topic: Tid) -> Option<&'static str> {
        if self
            .by_type
            .get(&topic)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
        {
            return Some("type");
        }
        for construct in self.arena.iter() {
            if let Body::Topic(b) = &construct.body {
                if b.types.contains(&topic) {
                    return Some("type");
                }
                if b.supertypes.contains(&topic) {
                    return Some("supertype");
                }
            }
        }
        let plays = self
            .arena
            .get(topic)
            .ok()
            .and_then(|c| c.topic().ok().map(|b| !b.roles_played.is_empty()))
            .unwrap_or(false);
        if plays {
            return Some("player");
        }
        if !self.scopes.scopes_with_theme(topic).is_empty() {
            return Some("theme");
        }
        let reifies = self
            .arena
            .get(topic)
            .ok()
            .and_then(|c| c.topic().ok().map(|b| b.reified.is_some()))
            .unwrap_or(false);
        if reifies {
            return Some("reifier");
        }
        None
    }

    fn unbind_identifiers(&mut self, id: Tid) -> Result<()> {
        let (iis, sis, sls): (Vec<Arc<Locator>>, Vec<Arc<Locator>>, Vec<Arc<Locator>>) = {
            let construct = self.arena.get(id)?;
            let iis = construct.item_identifiers.iter().map(Arc::clone).collect();
            match construct.topic() {
                Ok(b) => (
                    iis,
                    b.subject_identifiers.iter().map(Arc::clone).collect(),
                    b.subject_locators.iter().map(Arc::clone).collect(),
                ),
                Err(_) => (iis, Vec::new(), Vec::new()),
            }
        };
        for locator in iis {
            self.identity.erase_item_identifier(&locator);
            self.delete_identifier(locator.cid(), "ii")?;
        }
        for locator in sis {
            self.identity.erase_subject_identifier(&locator);
            self.delete_identifier(locator.cid(), "si")?;
        }
        for locator in sls {
            self.identity.erase_subject_locator(&locator);
            self.delete_identifier(locator.cid(), "sl")?;
        }
        Ok(())
    }

    /// Physically delete one construct and its structural children. Callers
    /// are responsible for the in-use policy; this only maintains the maps.
    pub(crate) fn remove_construct(&mut self, id: Tid) -> Result<()> {
        let id = self.identity.resolve(id);
        // copy everything needed out of the arena before mutating it
        struct Plan {
            kind: Kind,
            parent: Option<Tid>,
            reifier: Option<Tid>,
            reified: Option<Tid>,
            typing: Option<Tid>,
            scope: Option<ScopeRef>,
            player: Option<Tid>,
            children: Vec<Tid>,
            roles_played: Vec<Tid>,
        }
        let plan = {
            let c = self.arena.get(id)?;
            let (reified, children, roles_played, player) = match &c.body {
                Body::TopicMap(_) => {
                    return Err(TopikaError::Constraint(
                        "the topic map itself cannot be removed".to_owned(),
                    ));
                }
                Body::Topic(b) => {
                    let mut children = sorted_ids(&b.names);
                    children.extend(sorted_ids(&b.occurrences));
                    (b.reified, children, sorted_ids(&b.roles_played), None)
                }
                Body::Association(b) => (None, sorted_ids(&b.roles), Vec::new(), None),
                Body::Role(b) => (None, Vec::new(), Vec::new(), Some(b.player)),
                Body::Name(b) => (None, sorted_ids(&b.variants), Vec::new(), None),
                Body::Occurrence(_) | Body::Variant(_) => (None, Vec::new(), Vec::new(), None),
            };
            Plan {
                kind: c.kind(),
                parent: c.parent,
                reifier: c.body.reifier(),
                reified,
                typing: c.body.typing(),
                scope: c.body.scope().cloned(),
                player,
                children,
                roles_played,
            }
        };
        if plan.kind == Kind::Topic {
            for role in plan.roles_played.iter().copied() {
                if self.arena.contains(role) {
                    self.remove_construct(role)?;
                }
            }
            // constructs typed by this topic go with it
            let typed: Vec<Tid> = self
                .by_type
                .get(&id)
                .map(|set| set.iter().collect())
                .unwrap_or_default();
            for construct in typed {
                if self.arena.contains(construct) {
                    self.remove_construct(construct)?;
                }
            }
            let mut retyped: Vec<(Tid, bool)> = Vec::new();
            for construct in self.arena.iter() {
                if construct.id == id {
                    continue;
                }
                if let Body::Topic(other) = &construct.body {
                    if other.types.contains(&id) {
                        retyped.push((construct.id, false));
                    }
                    if other.supertypes.contains(&id) {
                        retyped.push((construct.id, true));
                    }
                }
            }
            for (other, supertype) in retyped {
                let body = self.arena.get_mut(other)?.topic_mut()?;
                if supertype {
                    body.supertypes.remove(&id);
                } else {
                    body.types.remove(&id);
                }
                if let Some(p) = self.persistor.as_mut() {
                    p.delete_topic_type(other, id, if supertype { "supertype" } else { "type" })?;
                }
            }
            let remap = self.scopes.substitute_theme(id, None);
            self.repoint_scopes(remap)?;
            if let Some(reified) = plan.reified {
                if self.arena.contains(reified) {
                    self.arena.get_mut(reified)?.body.set_reifier(None)?;
                    self.persist_full(reified)?;
                }
            }
        }
        for child in plan.children.iter().copied() {
            if self.arena.contains(child) {
                self.remove_construct(child)?;
            }
        }
        if let Some(player) = plan.player {
            if self.arena.contains(player) {
                self.arena
                    .get_mut(player)?
                    .topic_mut()?
                    .roles_played
                    .remove(&id);
            }
        }
        // detach from parent sets and indexes, then reclaim the slot
        self.unbind_identifiers(id)?;
        if let Some(r) = plan.reifier {
            if self.arena.contains(r) {
                self.arena.get_mut(r)?.topic_mut()?.reified = None;
            }
        }
        if let Some(t) = plan.typing {
            self.unindex_typed(id, t);
        }
        if let Some(s) = plan.scope {
            self.unindex_scoped(id, &s);
        }
        if let Some(parent) = plan.parent {
            if self.arena.contains(parent) {
                match &mut self.arena.get_mut(parent)?.body {
                    Body::Topic(b) => {
                        b.names.remove(&id);
                        b.occurrences.remove(&id);
                        b.roles_played.remove(&id);
                    }
                    Body::Association(b) => {
                        b.roles.remove(&id);
                    }
                    Body::Name(b) => {
                        b.variants.remove(&id);
                    }
                    _ => {}
                }
            }
        }
        self.arena.remove(id)?;
        if let Some(p) = self.persistor.as_mut() {
            p.delete_construct(id)?;
        }
        Ok(())
    }

    fn remove(&mut self, construct: Tid, cascade: bool) -> Result<Applied> {
        let construct = self.identity.resolve(construct);
        let kind = self.deref(construct)?.kind();
        if kind == Kind::Topic && !cascade {
            if let Some(usage) = self.topic_in_use(construct) {
                return Err(TopikaError::InUse {
                    topic: construct,
                    usage,
                });
            }
        }
        self.remove_construct(construct)?;
        self.notify(
            ChangeKind::Removed,
            construct,
            Datum::None,
            Datum::Id(construct),
        );
        Ok(Applied::none())
    }

    /// Repoint every construct scoped by a consolidated scope object.
    pub(crate) fn repoint_scopes(
        &mut self,
        remap: Vec<(ScopeRef, ScopeRef)>,
    ) -> Result<()> {
        for (old, new) in remap {
            let Some(ids) = self.by_scope.remove(&old.sid()) else {
                continue;
            };
            for id in ids.iter() {
                self.arena.get_mut(id)?.body.set_scope(Arc::clone(&new))?;
                self.persist_full(id)?;
            }
            if !new.is_unconstrained() {
                let target = self.by_scope.entry(new.sid()).or_default();
                *target |= ids;
            }
            debug!(%old, %new, "repointed scoped constructs");
        }
        Ok(())
    }

    // ------------- snapshots -------------
    fn snapshot_of(&self, construct: &Construct) -> ConstructSnapshot {
        let resolve = |id: Tid| self.identity.resolve(id);
        let resolve_all = |ids: &HashSet<Tid, TidHasher>| {
            let mut out: Vec<Tid> = ids.iter().map(|id| resolve(*id)).collect();
            out.sort_unstable();
            out
        };
        let body = match &construct.body {
            Body::TopicMap(b) => SnapshotBody::TopicMap {
                reifier: b.reifier.map(resolve),
            },
            Body::Topic(b) => SnapshotBody::Topic {
                subject_identifiers: sorted_references(&b.subject_identifiers),
                subject_locators: sorted_references(&b.subject_locators),
                types: resolve_all(&b.types),
                supertypes: resolve_all(&b.supertypes),
                names: resolve_all(&b.names),
                occurrences: resolve_all(&b.occurrences),
                roles_played: resolve_all(&b.roles_played),
                reified: b.reified.map(resolve),
            },
            Body::Association(b) => SnapshotBody::Association {
                typing: resolve(b.typing),
                themes: sorted_themes(&b.scope).into_iter().map(resolve).collect(),
                reifier: b.reifier.map(resolve),
                roles: resolve_all(&b.roles),
            },
            Body::Role(b) => SnapshotBody::Role {
                typing: resolve(b.typing),
                player: resolve(b.player),
                reifier: b.reifier.map(resolve),
            },
            Body::Name(b) => SnapshotBody::Name {
                typing: resolve(b.typing),
                value: b.value.clone(),
                themes: sorted_themes(&b.scope).into_iter().map(resolve).collect(),
                reifier: b.reifier.map(resolve),
                variants: resolve_all(&b.variants),
            },
            Body::Occurrence(b) => SnapshotBody::Occurrence {
                typing: resolve(b.typing),
                literal: b.literal.clone(),
                themes: sorted_themes(&b.scope).into_iter().map(resolve).collect(),
                reifier: b.reifier.map(resolve),
            },
            Body::Variant(b) => SnapshotBody::Variant {
                literal: b.literal.clone(),
                themes: sorted_themes(&b.scope).into_iter().map(resolve).collect(),
                reifier: b.reifier.map(resolve),
            },
        };
        ConstructSnapshot {
            id: construct.id,
            parent: construct.parent,
            item_identifiers: sorted_references(&construct.item_identifiers),
            body,
        }
    }

    fn ids_of_kind(&self, kind: Kind) -> Vec<Tid> {
        let mut ids: Vec<Tid> = self
            .arena
            .iter()
            .filter(|c| c.kind() == kind)
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // ------------- restore -------------
    fn restore(&mut self) -> Result<()> {
        let Some(mut persistor) = self.persistor.take() else {
            return Ok(());
        };
        let locators = persistor.all_locators()?;
        let constructs = persistor.all_constructs()?;
        let identifiers = persistor.all_identifiers()?;
        let topic_types = persistor.all_topic_types()?;
        let themes = persistor.all_themes()?;
        for (cid, reference) in locators {
            self.locators.restore(cid, reference);
        }
        for row in &constructs {
            let body = match Kind::from_str(&row.kind)? {
                Kind::TopicMap => {
                    self.topic_map = row.id;
                    Body::TopicMap(TopicMapBody {
                        reifier: row.reifier,
                    })
                }
                Kind::Topic => Body::Topic(TopicBody::default()),
                Kind::Association => Body::Association(AssociationBody {
                    typing: row.typing.unwrap_or_default(),
                    scope: self.scopes.unconstrained(),
                    reifier: row.reifier,
                    roles: Default::default(),
                }),
                Kind::Role => Body::Role(RoleBody {
                    typing: row.typing.unwrap_or_default(),
                    player: row.player.unwrap_or_default(),
                    reifier: row.reifier,
                }),
                Kind::Name => Body::Name(NameBody {
                    typing: row.typing.unwrap_or_default(),
                    value: row.value.clone().unwrap_or_default(),
                    scope: self.scopes.unconstrained(),
                    reifier: row.reifier,
                    variants: Default::default(),
                }),
                Kind::Occurrence => Body::Occurrence(OccurrenceBody {
                    typing: row.typing.unwrap_or_default(),
                    literal: Literal::new(
                        row.value.clone().unwrap_or_default(),
                        row.datatype.as_deref().unwrap_or(xsd::STRING),
                    )?,
                    scope: self.scopes.unconstrained(),
                    reifier: row.reifier,
                }),
                Kind::Variant => Body::Variant(VariantBody {
                    literal: Literal::new(
                        row.value.clone().unwrap_or_default(),
                        row.datatype.as_deref().unwrap_or(xsd::STRING),
                    )?,
                    scope: self.scopes.unconstrained(),
                    reifier: row.reifier,
                }),
            };
            self.arena.restore(Construct::new(row.id, row.parent, body));
        }
        self.arena.seal_restore();
        for (cid, construct, kind) in identifiers {
            let Some(locator) = self.locators.lookup(cid) else {
                continue;
            };
            match kind.as_str() {
                "si" => {
                    self.arena
                        .get_mut(construct)?
                        .topic_mut()?
                        .subject_identifiers
                        .insert(Arc::clone(&locator));
                    self.identity.record_subject_identifier(locator, construct);
                }
                "sl" => {
                    self.arena
                        .get_mut(construct)?
                        .topic_mut()?
                        .subject_locators
                        .insert(Arc::clone(&locator));
                    self.identity.record_subject_locator(locator, construct);
                }
                _ => {
                    self.arena
                        .get_mut(construct)?
                        .item_identifiers
                        .insert(Arc::clone(&locator));
                    self.identity.record_item_identifier(locator, construct);
                }
            }
        }
        for (topic, typing, kind) in topic_types {
            let body = self.arena.get_mut(topic)?.topic_mut()?;
            if kind == "supertype" {
                body.supertypes.insert(typing);
            } else {
                body.types.insert(typing);
            }
        }
        let mut theme_sets: HashMap<Tid, ThemeSet, TidHasher> = HashMap::default();
        for (construct, theme) in themes {
            theme_sets.entry(construct).or_default().insert(theme);
        }
        for (construct, set) in theme_sets {
            let (scope, _) = self.scopes.scope_of(set);
            self.arena
                .get_mut(construct)?
                .body
                .set_scope(Arc::clone(&scope))?;
            self.index_scoped(construct, &scope);
        }
        // derive the structural sets and the reification back-links
        let derived: Vec<(Tid, Kind, Option<Tid>, Option<Tid>, Option<Tid>)> = self
            .arena
            .iter()
            .map(|c| {
                (
                    c.id,
                    c.kind(),
                    c.parent,
                    c.body.typing(),
                    match &c.body {
                        Body::Role(b) => Some(b.player),
                        _ => None,
                    },
                )
            })
            .collect();
        let reifiers: Vec<(Tid, Tid)> = self
            .arena
            .iter()
            .filter_map(|c| c.body.reifier().map(|r| (r, c.id)))
            .collect();
        for (id, kind, parent, typing, player) in derived {
            if let Some(t) = typing {
                self.index_typed(id, t);
            }
            if let Some(parent) = parent {
                match kind {
                    Kind::Name => {
                        self.arena.get_mut(parent)?.topic_mut()?.names.insert(id);
                    }
                    Kind::Occurrence => {
                        self.arena
                            .get_mut(parent)?
                            .topic_mut()?
                            .occurrences
                            .insert(id);
                    }
                    Kind::Role => {
                        if let Body::Association(b) = &mut self.arena.get_mut(parent)?.body {
                            b.roles.insert(id);
                        }
                    }
                    Kind::Variant => {
                        if let Body::Name(b) = &mut self.arena.get_mut(parent)?.body {
                            b.variants.insert(id);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(player) = player {
                self.arena
                    .get_mut(player)?
                    .topic_mut()?
                    .roles_played
                    .insert(id);
            }
        }
        for (reifier, construct) in reifiers {
            self.arena.get_mut(reifier)?.topic_mut()?.reified = Some(construct);
        }
        self.persistor = Some(persistor);
        Ok(())
    }

    /// All known scope objects containing at least one (or, with
    /// `match_all`, all) of the given themes.
    pub fn scopes_containing(&self, themes: &[Tid], match_all: bool) -> Vec<ScopeRef> {
        let resolved: Vec<Tid> = themes.iter().map(|t| self.identity.resolve(*t)).collect();
        self.scopes.scopes_containing(&resolved, match_all)
    }
    pub fn superhash(&self) -> Option<String> {
        self.persistor.as_ref().and_then(|p| p.current_superhash())
    }
    pub fn construct_count(&self) -> usize {
        self.arena.len()
    }
    pub fn locator_count(&self) -> usize {
        self.locators.len()
    }
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

// ------------- the storage contract -------------
impl Store for Database {
    fn topic_map(&self) -> Tid {
        self.topic_map
    }
    fn apply(&mut self, op: Operation) -> Result<Applied> {
        match op {
            Operation::CreateTopic { map, seed } => {
                self.expect_map(map)?;
                self.create_topic(seed)
            }
            Operation::CreateAssociation { map, typing, themes } => {
                self.create_association(map, typing, &themes)
            }
            Operation::CreateRole { association, typing, player } => {
                self.create_role(association, typing, player)
            }
            Operation::CreateName { topic, typing, value, themes } => {
                self.create_name(topic, typing, value, &themes)
            }
            Operation::CreateOccurrence { topic, typing, literal, themes } => {
                self.create_occurrence(topic, typing, literal, &themes)
            }
            Operation::CreateVariant { name, literal, themes } => {
                self.create_variant(name, literal, &themes)
            }
            Operation::AddSubjectIdentifier { topic, iri } => {
                self.add_subject_identifier(topic, &iri)
            }
            Operation::RemoveSubjectIdentifier { topic, iri } => {
                self.remove_subject_identifier(topic, &iri)
            }
            Operation::AddSubjectLocator { topic, iri } => self.add_subject_locator(topic, &iri),
            Operation::RemoveSubjectLocator { topic, iri } => {
                self.remove_subject_locator(topic, &iri)
            }
            Operation::AddItemIdentifier { construct, iri } => {
                self.add_item_identifier(construct, &iri)
            }
            Operation::RemoveItemIdentifier { construct, iri } => {
                self.remove_item_identifier(construct, &iri)
            }
            Operation::MergeTopics { topic, other } => {
                let topic = self.expect_topic(topic)?;
                let other = self.expect_topic(other)?;
                let survivor = self.merge_topics(topic, other)?;
                Ok(Applied::created(survivor))
            }
            Operation::AddType { topic, typing } => {
                self.add_topic_ref(topic, typing, false, ChangeKind::TypeAdded)
            }
            Operation::RemoveType { topic, typing } => {
                self.remove_topic_ref(topic, typing, false, ChangeKind::TypeRemoved)
            }
            Operation::AddSupertype { topic, supertype } => {
                self.add_topic_ref(topic, supertype, true, ChangeKind::SupertypeAdded)
            }
            Operation::RemoveSupertype { topic, supertype } => {
                self.remove_topic_ref(topic, supertype, true, ChangeKind::SupertypeRemoved)
            }
            Operation::SetType { construct, typing } => self.set_type(construct, typing),
            Operation::SetValue { construct, literal } => self.set_value(construct, literal),
            Operation::SetPlayer { role, player } => self.set_player(role, player),
            Operation::SetReifier { construct, reifier } => self.set_reifier(construct, reifier),
            Operation::AddTheme { construct, theme } => self.reshape_scope(construct, theme, true),
            Operation::RemoveTheme { construct, theme } => {
                self.reshape_scope(construct, theme, false)
            }
            Operation::RemoveDuplicates { topic } => {
                let topic = self.expect_topic(topic)?;
                let coalesced = self.remove_duplicate_names(topic)?;
                self.notify(
                    ChangeKind::DuplicatesRemoved,
                    topic,
                    Datum::Text(coalesced.to_string()),
                    Datum::None,
                );
                Ok(Applied::none())
            }
            Operation::Remove { construct, cascade } => self.remove(construct, cascade),
        }
    }
    fn snapshot(&self, id: Tid) -> Result<ConstructSnapshot> {
        let construct = self.deref(id)?;
        Ok(self.snapshot_of(construct))
    }
    fn contains(&self, id: Tid) -> bool {
        self.arena.contains(self.identity.resolve(id))
    }
    fn resolve(&self, id: Tid) -> Tid {
        self.identity.resolve(id)
    }
    fn topics(&self) -> Vec<Tid> {
        self.ids_of_kind(Kind::Topic)
    }
    fn associations(&self) -> Vec<Tid> {
        self.ids_of_kind(Kind::Association)
    }
    fn topic_by_subject_identifier(&self, iri: &str) -> Option<Tid> {
        let locator = self.locators.get(iri)?;
        self.identity
            .topic_by_subject_identifier(&locator)
            .map(|id| self.identity.resolve(id))
    }
    fn topic_by_subject_locator(&self, iri: &str) -> Option<Tid> {
        let locator = self.locators.get(iri)?;
        self.identity
            .topic_by_subject_locator(&locator)
            .map(|id| self.identity.resolve(id))
    }
    fn construct_by_item_identifier(&self, iri: &str) -> Option<Tid> {
        let locator = self.locators.get(iri)?;
        self.identity
            .construct_by_item_identifier(&locator)
            .map(|id| self.identity.resolve(id))
    }
    fn constructs_by_type(&self, typing: Tid) -> Vec<Tid> {
        let typing = self.identity.resolve(typing);
        self.by_type
            .get(&typing)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }
    fn scoped_by_theme(&self, theme: Tid) -> Vec<Tid> {
        let theme = self.identity.resolve(theme);
        let mut out = RoaringTreemap::new();
        for scope in self.scopes.scopes_with_theme(theme) {
            if let Some(ids) = self.by_scope.get(&scope.sid()) {
                out |= ids;
            }
        }
        out.iter().collect()
    }
    fn associations_by_theme(&self, theme: Tid) -> Vec<Tid> {
        self.scoped_by_theme(theme)
            .into_iter()
            .filter(|id| {
                self.arena
                    .get(*id)
                    .map(|c| c.kind() == Kind::Association)
                    .unwrap_or(false)
            })
            .collect()
    }
    fn subscribe(&mut self, listener: Arc<dyn Listener>) -> ListenerId {
        self.next_listener += 1;
        self.listeners.push((self.next_listener, listener));
        self.next_listener
    }
    fn unsubscribe(&mut self, listener: ListenerId) {
        self.listeners.retain(|(id, _)| *id != listener);
    }
}
