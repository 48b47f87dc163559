//! The transaction overlay: a speculative, isolated working copy of the
//! graph that records every mutation as a replayable command.
//!
//! The overlay wraps any backing [`Store`]. The first time a backing
//! construct is touched, its snapshot is mirrored into a private in-memory
//! [`Database`] under a transaction-local id; the local/backing id pair goes
//! into an explicit resolution table. From then on the construct no longer
//! reflects concurrent changes to the backing store (snapshot isolation at
//! per-construct granularity). `commit` replays the command log in order
//! against the backing store, cleaning every parameter from local to backing
//! identity space; merges the replay provokes in the backing store are
//! observed through a temporary listener and folded into the resolution
//! table so later commands land on the surviving topic.
//!
//! Because the overlay itself implements [`Store`], transactions nest.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::construct::{ConstructSnapshot, Kind, SnapshotBody, Tid, TidHasher};
use crate::database::{Database, PersistenceMode};
use crate::error::{Result, TopikaError};
use crate::store::{
    Applied, Change, ChangeKind, Datum, Listener, ListenerId, Operation, Store,
};

// ------------- transaction state -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    Closed,
}

struct LoggedOp {
    op: Operation,
    // the transaction-local construct a create produced, so replay can map
    // it to whatever the backing store hands back
    created: Option<Tid>,
}

// ------------- workspace -------------
struct Workspace {
    local: Database,
    to_backing: HashMap<Tid, Tid, TidHasher>,
    to_local: HashMap<Tid, Tid, TidHasher>,
    pulled: HashSet<Tid, TidHasher>,
}

impl Workspace {
    /// Allocate (or find) the transaction-local id standing for a backing
    /// construct. Does not copy any data; the stub is filled by [`pull`].
    fn ensure_local(&mut self, backing: &dyn Store, bid: Tid) -> Tid {
        let bid = backing.resolve(bid);
        if let Some(lid) = self.to_local.get(&bid) {
            return self.local.resolve(*lid);
        }
        let lid = self.local.arena.allocate();
        self.to_local.insert(bid, lid);
        self.to_backing.insert(lid, bid);
        lid
    }
    /// Copy-on-first-touch: materialize the backing construct behind a
    /// transaction-local stub. No-op for constructs created inside the
    /// transaction and for already pulled ones.
    fn pull(&mut self, backing: &dyn Store, id: Tid) -> Result<()> {
        let lid = self.local.resolve(id);
        if self.pulled.contains(&lid) {
            return Ok(());
        }
        let Some(bid) = self.to_backing.get(&lid).copied() else {
            // born in this transaction; it has no backing counterpart
            return if self.local.contains(lid) {
                Ok(())
            } else {
                Err(TopikaError::Removed(id))
            };
        };
        let snapshot = backing.snapshot(bid)?;
        let translated = self.translate(backing, snapshot);
        self.install(lid, translated)?;
        self.pulled.insert(lid);
        debug!(local = lid, backing = bid, "mirrored construct");
        Ok(())
    }
    /// Rewrite a backing-space snapshot into transaction-local ids,
    /// allocating stubs for constructs not seen before.
    fn translate(&mut self, backing: &dyn Store, snapshot: ConstructSnapshot) -> ConstructSnapshot {
        let mut m = |id: Tid| self.ensure_local(backing, id);
        let body = match snapshot.body {
            SnapshotBody::TopicMap { reifier } => SnapshotBody::TopicMap {
                reifier: reifier.map(&mut m),
            },
            SnapshotBody::Topic {
                subject_identifiers,
                subject_locators,
                types,
                supertypes,
                names,
                occurrences,
                roles_played,
                reified,
            } => SnapshotBody::Topic {
                subject_identifiers,
                subject_locators,
                types: types.into_iter().map(&mut m).collect(),
                supertypes: supertypes.into_iter().map(&mut m).collect(),
                names: names.into_iter().map(&mut m).collect(),
                occurrences: occurrences.into_iter().map(&mut m).collect(),
                roles_played: roles_played.into_iter().map(&mut m).collect(),
                reified: reified.map(&mut m),
            },
            SnapshotBody::Association {
                typing,
                themes,
                reifier,
                roles,
            } => SnapshotBody::Association {
                typing: m(typing),
                themes: themes.into_iter().map(&mut m).collect(),
                reifier: reifier.map(&mut m),
                roles: roles.into_iter().map(&mut m).collect(),
            },
            SnapshotBody::Role {
                typing,
                player,
                reifier,
            } => SnapshotBody::Role {
                typing: m(typing),
                player: m(player),
                reifier: reifier.map(&mut m),
            },
            SnapshotBody::Name {
                typing,
                value,
                themes,
                reifier,
                variants,
            } => SnapshotBody::Name {
                typing: m(typing),
                value,
                themes: themes.into_iter().map(&mut m).collect(),
                reifier: reifier.map(&mut m),
                variants: variants.into_iter().map(&mut m).collect(),
            },
            SnapshotBody::Occurrence {
                typing,
                literal,
                themes,
                reifier,
            } => SnapshotBody::Occurrence {
                typing: m(typing),
                literal,
                themes: themes.into_iter().map(&mut m).collect(),
                reifier: reifier.map(&mut m),
            },
            SnapshotBody::Variant {
                literal,
                themes,
                reifier,
            } => SnapshotBody::Variant {
                literal,
                themes: themes.into_iter().map(&mut m).collect(),
                reifier: reifier.map(&mut m),
            },
        };
        ConstructSnapshot {
            id: snapshot.id,
            parent: snapshot.parent.map(&mut m),
            item_identifiers: snapshot.item_identifiers,
            body,
        }
    }
    /// Seat a translated snapshot in the local database under `lid`,
    /// registering identity bindings and indexes as the real store would.
    fn install(&mut self, lid: Tid, snapshot: ConstructSnapshot) -> Result<()> {
        use crate::construct::{
            AssociationBody, Body, Construct, NameBody, OccurrenceBody, RoleBody, TopicBody,
            TopicMapBody, VariantBody,
        };
        let mut scope_of = |local: &mut Database, themes: &[Tid]| {
            let set = themes.iter().copied().collect();
            local.scopes.scope_of(set).0
        };
        let mut construct = Construct::new(lid, snapshot.parent, Body::TopicMap(TopicMapBody::default()));
        for iri in &snapshot.item_identifiers {
            let (locator, _) = self.local.locators.keep(iri)?;
            self.local
                .identity
                .record_item_identifier(Arc::clone(&locator), lid);
            construct.item_identifiers.insert(locator);
        }
        construct.body = match snapshot.body {
            SnapshotBody::TopicMap { reifier } => Body::TopicMap(TopicMapBody { reifier }),
            SnapshotBody::Topic {
                subject_identifiers,
                subject_locators,
                types,
                supertypes,
                names,
                occurrences,
                roles_played,
                reified,
            } => {
                let mut body = TopicBody {
                    types: types.into_iter().collect(),
                    supertypes: supertypes.into_iter().collect(),
                    names: names.into_iter().collect(),
                    occurrences: occurrences.into_iter().collect(),
                    roles_played: roles_played.into_iter().collect(),
                    reified,
                    ..Default::default()
                };
                for iri in &subject_identifiers {
                    let (locator, _) = self.local.locators.keep(iri)?;
                    self.local
                        .identity
                        .record_subject_identifier(Arc::clone(&locator), lid);
                    body.subject_identifiers.insert(locator);
                }
                for iri in &subject_locators {
                    let (locator, _) = self.local.locators.keep(iri)?;
                    self.local
                        .identity
                        .record_subject_locator(Arc::clone(&locator), lid);
                    body.subject_locators.insert(locator);
                }
                Body::Topic(body)
            }
            SnapshotBody::Association {
                typing,
                themes,
                reifier,
                roles,
            } => {
                let scope = scope_of(&mut self.local, &themes);
                Body::Association(AssociationBody {
                    typing,
                    scope,
                    reifier,
                    roles: roles.into_iter().collect(),
                })
            }
            SnapshotBody::Role {
                typing,
                player,
                reifier,
            } => Body::Role(RoleBody {
                typing,
                player,
                reifier,
            }),
            SnapshotBody::Name {
                typing,
                value,
                themes,
                reifier,
                variants,
            } => {
                let scope = scope_of(&mut self.local, &themes);
                Body::Name(NameBody {
                    typing,
                    value,
                    scope,
                    reifier,
                    variants: variants.into_iter().collect(),
                })
            }
            SnapshotBody::Occurrence {
                typing,
                literal,
                themes,
                reifier,
            } => {
                let scope = scope_of(&mut self.local, &themes);
                Body::Occurrence(OccurrenceBody {
                    typing,
                    literal,
                    scope,
                    reifier,
                })
            }
            SnapshotBody::Variant {
                literal,
                themes,
                reifier,
            } => {
                let scope = scope_of(&mut self.local, &themes);
                Body::Variant(VariantBody {
                    literal,
                    scope,
                    reifier,
                })
            }
        };
        if let Some(typing) = construct.body.typing() {
            self.local.index_typed(lid, typing);
        }
        if let Some(scope) = construct.body.scope().cloned() {
            self.local.index_scoped(lid, &scope);
        }
        self.local.arena.install(construct);
        Ok(())
    }
    /// Pull a topic together with everything a merge would touch on it.
    fn pull_for_merge(&mut self, backing: &dyn Store, id: Tid) -> Result<()> {
        self.pull(backing, id)?;
        let lid = self.local.resolve(id);
        let snapshot = self.local.snapshot(lid)?;
        if let SnapshotBody::Topic {
            names,
            occurrences,
            roles_played,
            reified,
            ..
        } = snapshot.body
        {
            for id in occurrences.iter().chain(roles_played.iter()) {
                self.pull(backing, *id)?;
            }
            for name in names {
                self.pull(backing, name)?;
                if let SnapshotBody::Name { variants, .. } = self.local.snapshot(name)?.body {
                    for variant in variants {
                        self.pull(backing, variant)?;
                    }
                }
            }
            if let Some(reified) = reified {
                self.pull(backing, reified)?;
            }
        }
        Ok(())
    }
    /// Pull a construct and its whole structural subtree, ahead of removal.
    fn pull_subtree(&mut self, backing: &dyn Store, id: Tid) -> Result<()> {
        self.pull(backing, id)?;
        let lid = self.local.resolve(id);
        let children: Vec<Tid> = match self.local.snapshot(lid)?.body {
            SnapshotBody::Topic {
                names,
                occurrences,
                roles_played,
                ..
            } => names
                .into_iter()
                .chain(occurrences)
                .chain(roles_played)
                .collect(),
            SnapshotBody::Association { roles, .. } => roles,
            SnapshotBody::Name { variants, .. } => variants,
            _ => Vec::new(),
        };
        for child in children {
            self.pull_subtree(backing, child)?;
        }
        Ok(())
    }
    fn lookup_subject_identifier(&mut self, backing: &dyn Store, iri: &str) -> Option<Tid> {
        if let Some(lid) = self.local.topic_by_subject_identifier(iri) {
            return Some(lid);
        }
        let bid = backing.topic_by_subject_identifier(iri)?;
        let lid = self.ensure_local(backing, bid);
        // a pulled construct that no longer carries the binding has shed it
        // inside this transaction; the backing view no longer applies
        (!self.pulled.contains(&lid)).then_some(lid)
    }
    fn lookup_subject_locator(&mut self, backing: &dyn Store, iri: &str) -> Option<Tid> {
        if let Some(lid) = self.local.topic_by_subject_locator(iri) {
            return Some(lid);
        }
        let bid = backing.topic_by_subject_locator(iri)?;
        let lid = self.ensure_local(backing, bid);
        (!self.pulled.contains(&lid)).then_some(lid)
    }
    fn lookup_item_identifier(&mut self, backing: &dyn Store, iri: &str) -> Option<Tid> {
        if let Some(lid) = self.local.construct_by_item_identifier(iri) {
            return Some(lid);
        }
        let bid = backing.construct_by_item_identifier(iri)?;
        let lid = self.ensure_local(backing, bid);
        (!self.pulled.contains(&lid)).then_some(lid)
    }
}

// ------------- merge tap -------------
/// Temporary listener attached to the backing store for the duration of a
/// commit; captures merges so the resolution table can follow survivors.
#[derive(Default)]
struct MergeTap {
    merges: Mutex<Vec<(Tid, Tid)>>,
}
impl MergeTap {
    fn drain(&self) -> Vec<(Tid, Tid)> {
        std::mem::take(&mut *self.merges.lock().unwrap())
    }
}
impl Listener for MergeTap {
    fn notify(&self, change: &Change) {
        if change.kind == ChangeKind::Merged {
            if let (Datum::Id(survivor), Datum::Id(loser)) = (&change.new, &change.old) {
                self.merges.lock().unwrap().push((*loser, *survivor));
            }
        }
    }
}

// ------------- Transaction -------------
pub struct Transaction<'s> {
    backing: &'s mut dyn Store,
    inner: RefCell<Workspace>,
    log: Vec<LoggedOp>,
    state: TxState,
}

impl<'s> Transaction<'s> {
    pub fn begin(backing: &'s mut dyn Store) -> Result<Transaction<'s>> {
        let local = Database::new(PersistenceMode::InMemory)?;
        let mut workspace = Workspace {
            local,
            to_backing: HashMap::default(),
            to_local: HashMap::default(),
            pulled: HashSet::default(),
        };
        let backing_map = backing.topic_map();
        let local_map = workspace.local.topic_map();
        workspace.to_local.insert(backing_map, local_map);
        workspace.to_backing.insert(local_map, backing_map);
        Ok(Transaction {
            backing,
            inner: RefCell::new(workspace),
            log: Vec::new(),
            state: TxState::Open,
        })
    }
    pub fn state(&self) -> TxState {
        self.state
    }
    fn ensure_open(&self) -> Result<()> {
        match self.state {
            TxState::Open => Ok(()),
            _ => Err(TopikaError::Transaction(
                "transaction is no longer open".to_owned(),
            )),
        }
    }
    /// Bring a backing-store construct into transaction space explicitly.
    pub fn import(&mut self, backing_id: Tid) -> Result<Tid> {
        self.ensure_open()?;
        let backing: &dyn Store = &*self.backing;
        let ws = self.inner.get_mut();
        let lid = ws.ensure_local(backing, backing_id);
        ws.pull(backing, lid)?;
        Ok(ws.local.resolve(lid))
    }
    pub fn log_len(&self) -> usize {
        self.log.len()
    }
    /// Blake3 digest over the canonical form of the command log.
    pub fn log_digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for entry in &self.log {
            entry.op.hash_into(&mut hasher);
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Discard the command log; nothing ever reaches the backing store.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.log.clear();
        self.state = TxState::Closed;
        Ok(())
    }
    /// Alias for [`Self::rollback`] on an open transaction; harmless on a
    /// finished one.
    pub fn close(&mut self) {
        if self.state == TxState::Open {
            self.log.clear();
            self.state = TxState::Closed;
        }
    }

    /// Replay the command log against the backing store.
    ///
    /// The whole log is validated first: every construct parameter must be
    /// resolvable to backing space, either through the resolution table, an
    /// earlier create in the log, or (for constructs never persisted) one of
    /// its locators. Only then is anything applied. Should a command still
    /// fail mid-replay, the error names exactly how many commands were
    /// applied; it is never swallowed.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let ws = self.inner.get_mut();
        // pre-validation pass, nothing applied yet
        let mut known: HashSet<Tid, TidHasher> = ws.to_backing.keys().copied().collect();
        for (index, entry) in self.log.iter().enumerate() {
            for id in entry.op.ids() {
                let lid = ws.local.resolve(id);
                if known.contains(&id) || known.contains(&lid) {
                    continue;
                }
                if ws.local.contains(lid) && has_locators(&ws.local, lid) {
                    continue;
                }
                return Err(TopikaError::Transaction(format!(
                    "command {index} references construct {id} with no backing-store counterpart"
                )));
            }
            if let Some(created) = entry.created {
                known.insert(ws.local.resolve(created));
                known.insert(created);
            }
        }
        // replay with a merge tap attached to the backing store
        let tap = Arc::new(MergeTap::default());
        let tap_id = self.backing.subscribe(Arc::clone(&tap) as Arc<dyn Listener>);
        let mut resolution: HashMap<Tid, Tid, TidHasher> = ws.to_backing.clone();
        let total = self.log.len();
        let mut applied_count = 0usize;
        let mut failure: Option<TopikaError> = None;
        for entry in &self.log {
            let backing_ref: &dyn Store = &*self.backing;
            let cleaned = entry
                .op
                .map_ids(&mut |id| clean_id(ws, backing_ref, &resolution, id));
            let cleaned = match cleaned {
                Ok(op) => op,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            match self.backing.apply(cleaned) {
                Ok(applied) => {
                    if let (Some(local_created), Some(backing_created)) =
                        (entry.created, applied.created)
                    {
                        resolution.insert(local_created, backing_created);
                        resolution.insert(ws.local.resolve(local_created), backing_created);
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
            applied_count += 1;
            for (loser, survivor) in tap.drain() {
                for target in resolution.values_mut() {
                    if *target == loser {
                        *target = survivor;
                    }
                }
            }
        }
        self.backing.unsubscribe(tap_id);
        if let Some(error) = failure {
            self.state = TxState::Closed;
            return Err(TopikaError::Commit {
                applied: applied_count,
                total,
                message: error.to_string(),
            });
        }
        self.state = TxState::Committed;
        info!(commands = total, "transaction committed");
        Ok(())
    }
}

fn has_locators(local: &Database, id: Tid) -> bool {
    match local.snapshot(id) {
        Ok(snapshot) => {
            if !snapshot.item_identifiers.is_empty() {
                return true;
            }
            matches!(
                &snapshot.body,
                SnapshotBody::Topic {
                    subject_identifiers,
                    subject_locators,
                    ..
                } if !subject_identifiers.is_empty() || !subject_locators.is_empty()
            )
        }
        Err(_) => false,
    }
}

/// Clean one construct parameter from transaction space to backing space:
/// resolution table first, then the local merge redirects, then the
/// by-locator fallbacks for constructs created in this transaction whose
/// backing identity only exists because replay already produced it.
fn clean_id(
    ws: &Workspace,
    backing: &dyn Store,
    resolution: &HashMap<Tid, Tid, TidHasher>,
    id: Tid,
) -> Result<Tid> {
    if let Some(bid) = resolution.get(&id) {
        return Ok(backing.resolve(*bid));
    }
    let lid = ws.local.resolve(id);
    if let Some(bid) = resolution.get(&lid) {
        return Ok(backing.resolve(*bid));
    }
    if let Ok(snapshot) = ws.local.snapshot(lid) {
        for iri in &snapshot.item_identifiers {
            if let Some(bid) = backing.construct_by_item_identifier(iri) {
                return Ok(bid);
            }
        }
        if let SnapshotBody::Topic {
            subject_identifiers,
            subject_locators,
            ..
        } = &snapshot.body
        {
            for iri in subject_identifiers {
                if let Some(bid) = backing.topic_by_subject_identifier(iri) {
                    return Ok(bid);
                }
            }
            for iri in subject_locators {
                if let Some(bid) = backing.topic_by_subject_locator(iri) {
                    return Ok(bid);
                }
            }
        }
    }
    Err(TopikaError::Transaction(format!(
        "construct {id} cannot be resolved against the backing store"
    )))
}

// ------------- the storage contract, transactionally -------------
impl Store for Transaction<'_> {
    fn topic_map(&self) -> Tid {
        self.inner.borrow().local.topic_map()
    }
    fn apply(&mut self, op: Operation) -> Result<Applied> {
        self.ensure_open()?;
        {
            let backing: &dyn Store = &*self.backing;
            let ws = self.inner.get_mut();
            // everything an operation names must be mirrored before the
            // local store can run it
            for id in op.ids() {
                ws.pull(backing, id)?;
            }
            match &op {
                Operation::AddSubjectIdentifier { topic, iri } => {
                    if let Some(other) = ws.lookup_subject_identifier(backing, iri) {
                        ws.pull_for_merge(backing, other)?;
                        ws.pull_for_merge(backing, *topic)?;
                    }
                }
                Operation::AddSubjectLocator { topic, iri } => {
                    if let Some(other) = ws.lookup_subject_locator(backing, iri) {
                        ws.pull_for_merge(backing, other)?;
                        ws.pull_for_merge(backing, *topic)?;
                    }
                }
                Operation::AddItemIdentifier { construct, iri } => {
                    if let Some(other) = ws.lookup_item_identifier(backing, iri) {
                        ws.pull(backing, other)?;
                        if matches!(
                            ws.local.snapshot(other).map(|s| s.kind()),
                            Ok(Kind::Topic)
                        ) {
                            ws.pull_for_merge(backing, other)?;
                            ws.pull_for_merge(backing, *construct)?;
                        }
                    }
                }
                Operation::CreateTopic { seed, .. } => {
                    use crate::store::TopicSeed;
                    let found = match seed {
                        TopicSeed::SubjectIdentifier(iri) => {
                            ws.lookup_subject_identifier(backing, iri).or_else(|| {
                                ws.lookup_item_identifier(backing, iri)
                            })
                        }
                        TopicSeed::SubjectLocator(iri) => ws.lookup_subject_locator(backing, iri),
                        TopicSeed::ItemIdentifier(iri) => {
                            ws.lookup_item_identifier(backing, iri).or_else(|| {
                                ws.lookup_subject_identifier(backing, iri)
                            })
                        }
                        TopicSeed::None => None,
                    };
                    if let Some(existing) = found {
                        ws.pull(backing, existing)?;
                    }
                }
                Operation::MergeTopics { topic, other } => {
                    ws.pull_for_merge(backing, *topic)?;
                    ws.pull_for_merge(backing, *other)?;
                }
                Operation::RemoveDuplicates { topic } => {
                    ws.pull_for_merge(backing, *topic)?;
                }
                Operation::Remove { construct, .. } => {
                    ws.pull_subtree(backing, *construct)?;
                }
                _ => {}
            }
        }
        let applied = self.inner.get_mut().local.apply(op.clone())?;
        self.log.push(LoggedOp {
            op,
            created: applied.created,
        });
        Ok(applied)
    }
    fn snapshot(&self, id: Tid) -> Result<ConstructSnapshot> {
        let backing: &dyn Store = &*self.backing;
        let mut ws = self.inner.borrow_mut();
        ws.pull(backing, id)?;
        let lid = ws.local.resolve(id);
        ws.local.snapshot(lid)
    }
    fn contains(&self, id: Tid) -> bool {
        let ws = self.inner.borrow();
        let lid = ws.local.resolve(id);
        if ws.local.contains(lid) {
            return true;
        }
        if ws.pulled.contains(&lid) {
            // mirrored and since removed inside the transaction
            return false;
        }
        match ws.to_backing.get(&lid) {
            Some(bid) => self.backing.contains(*bid),
            None => false,
        }
    }
    fn resolve(&self, id: Tid) -> Tid {
        let ws = self.inner.borrow();
        if let Some(lid) = ws.to_local.get(&id) {
            return ws.local.resolve(*lid);
        }
        ws.local.resolve(id)
    }
    fn topics(&self) -> Vec<Tid> {
        let backing: &dyn Store = &*self.backing;
        let mut ws = self.inner.borrow_mut();
        let mut out = ws.local.topics();
        for bid in backing.topics() {
            let lid = ws.ensure_local(backing, bid);
            if !ws.pulled.contains(&lid) && !ws.local.contains(lid) {
                out.push(lid);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
    fn associations(&self) -> Vec<Tid> {
        let backing: &dyn Store = &*self.backing;
        let mut ws = self.inner.borrow_mut();
        let mut out = ws.local.associations();
        for bid in backing.associations() {
            let lid = ws.ensure_local(backing, bid);
            if !ws.pulled.contains(&lid) && !ws.local.contains(lid) {
                out.push(lid);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
    fn topic_by_subject_identifier(&self, iri: &str) -> Option<Tid> {
        let backing: &dyn Store = &*self.backing;
        self.inner
            .borrow_mut()
            .lookup_subject_identifier(backing, iri)
    }
    fn topic_by_subject_locator(&self, iri: &str) -> Option<Tid> {
        let backing: &dyn Store = &*self.backing;
        self.inner
            .borrow_mut()
            .lookup_subject_locator(backing, iri)
    }
    fn construct_by_item_identifier(&self, iri: &str) -> Option<Tid> {
        let backing: &dyn Store = &*self.backing;
        self.inner
            .borrow_mut()
            .lookup_item_identifier(backing, iri)
    }
    fn constructs_by_type(&self, typing: Tid) -> Vec<Tid> {
        let backing: &dyn Store = &*self.backing;
        let mut ws = self.inner.borrow_mut();
        let typing = ws.local.resolve(typing);
        let mut out = ws.local.constructs_by_type(typing);
        if let Some(btyping) = ws.to_backing.get(&typing).copied() {
            for bid in backing.constructs_by_type(btyping) {
                let lid = ws.ensure_local(backing, bid);
                if !ws.pulled.contains(&lid) && !ws.local.contains(lid) {
                    out.push(lid);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
    fn scoped_by_theme(&self, theme: Tid) -> Vec<Tid> {
        let backing: &dyn Store = &*self.backing;
        let mut ws = self.inner.borrow_mut();
        let theme = ws.local.resolve(theme);
        let mut out = ws.local.scoped_by_theme(theme);
        if let Some(btheme) = ws.to_backing.get(&theme).copied() {
            for bid in backing.scoped_by_theme(btheme) {
                let lid = ws.ensure_local(backing, bid);
                if !ws.pulled.contains(&lid) && !ws.local.contains(lid) {
                    out.push(lid);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
    fn associations_by_theme(&self, theme: Tid) -> Vec<Tid> {
        let backing: &dyn Store = &*self.backing;
        let mut ws = self.inner.borrow_mut();
        let theme = ws.local.resolve(theme);
        let mut out = ws.local.associations_by_theme(theme);
        if let Some(btheme) = ws.to_backing.get(&theme).copied() {
            for bid in backing.associations_by_theme(btheme) {
                let lid = ws.ensure_local(backing, bid);
                if !ws.pulled.contains(&lid) && !ws.local.contains(lid) {
                    out.push(lid);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
    fn subscribe(&mut self, listener: Arc<dyn Listener>) -> ListenerId {
        self.inner.get_mut().local.subscribe(listener)
    }
    fn unsubscribe(&mut self, listener: ListenerId) {
        self.inner.get_mut().local.unsubscribe(listener);
    }
}
