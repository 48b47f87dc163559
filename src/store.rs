//! The storage contract: the operation vocabulary every backend speaks.
//!
//! Mutations are values of [`Operation`], one strongly typed payload variant
//! per operation kind, applied through [`Store::apply`]. Reads are explicit
//! trait methods and never mutate. The transaction overlay records
//! operations verbatim as its command log, which is why every construct
//! parameter is a plain [`Tid`]: replaying a command in another identity
//! space only requires rewriting those ids.

use std::sync::Arc;

use crate::construct::{ConstructSnapshot, Tid};
use crate::datatype::Literal;
use crate::error::Result;

// ------------- Operation -------------
/// How a new topic announces its identity at creation time. A seed locator
/// lets the store unify the new topic with an existing one instead of
/// creating a duplicate subject.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicSeed {
    None,
    SubjectIdentifier(String),
    SubjectLocator(String),
    ItemIdentifier(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    // creates
    CreateTopic { map: Tid, seed: TopicSeed },
    CreateAssociation { map: Tid, typing: Tid, themes: Vec<Tid> },
    CreateRole { association: Tid, typing: Tid, player: Tid },
    CreateName { topic: Tid, typing: Option<Tid>, value: String, themes: Vec<Tid> },
    CreateOccurrence { topic: Tid, typing: Tid, literal: Literal, themes: Vec<Tid> },
    CreateVariant { name: Tid, literal: Literal, themes: Vec<Tid> },
    // identity
    AddSubjectIdentifier { topic: Tid, iri: String },
    RemoveSubjectIdentifier { topic: Tid, iri: String },
    AddSubjectLocator { topic: Tid, iri: String },
    RemoveSubjectLocator { topic: Tid, iri: String },
    AddItemIdentifier { construct: Tid, iri: String },
    RemoveItemIdentifier { construct: Tid, iri: String },
    MergeTopics { topic: Tid, other: Tid },
    // typing
    AddType { topic: Tid, typing: Tid },
    RemoveType { topic: Tid, typing: Tid },
    AddSupertype { topic: Tid, supertype: Tid },
    RemoveSupertype { topic: Tid, supertype: Tid },
    SetType { construct: Tid, typing: Tid },
    // values and players
    SetValue { construct: Tid, literal: Literal },
    SetPlayer { role: Tid, player: Tid },
    // reification
    SetReifier { construct: Tid, reifier: Option<Tid> },
    // scope
    AddTheme { construct: Tid, theme: Tid },
    RemoveTheme { construct: Tid, theme: Tid },
    // maintenance
    RemoveDuplicates { topic: Tid },
    // removal
    Remove { construct: Tid, cascade: bool },
}

impl Operation {
    /// Rewrite every construct-valued parameter through `f`, element-wise for
    /// theme arrays. This is the single place replay-time parameter cleaning
    /// happens, so a new variant cannot be forgotten without the match below
    /// failing to compile.
    pub fn map_ids(&self, f: &mut impl FnMut(Tid) -> Result<Tid>) -> Result<Operation> {
        use Operation::*;
        let mapped = match self {
            CreateTopic { map, seed } => CreateTopic {
                map: f(*map)?,
                seed: seed.clone(),
            },
            CreateAssociation { map, typing, themes } => CreateAssociation {
                map: f(*map)?,
                typing: f(*typing)?,
                themes: map_all(themes, f)?,
            },
            CreateRole { association, typing, player } => CreateRole {
                association: f(*association)?,
                typing: f(*typing)?,
                player: f(*player)?,
            },
            CreateName { topic, typing, value, themes } => CreateName {
                topic: f(*topic)?,
                typing: typing.map(&mut *f).transpose()?,
                value: value.clone(),
                themes: map_all(themes, f)?,
            },
            CreateOccurrence { topic, typing, literal, themes } => CreateOccurrence {
                topic: f(*topic)?,
                typing: f(*typing)?,
                literal: literal.clone(),
                themes: map_all(themes, f)?,
            },
            CreateVariant { name, literal, themes } => CreateVariant {
                name: f(*name)?,
                literal: literal.clone(),
                themes: map_all(themes, f)?,
            },
            AddSubjectIdentifier { topic, iri } => AddSubjectIdentifier {
                topic: f(*topic)?,
                iri: iri.clone(),
            },
            RemoveSubjectIdentifier { topic, iri } => RemoveSubjectIdentifier {
                topic: f(*topic)?,
                iri: iri.clone(),
            },
            AddSubjectLocator { topic, iri } => AddSubjectLocator {
                topic: f(*topic)?,
                iri: iri.clone(),
            },
            RemoveSubjectLocator { topic, iri } => RemoveSubjectLocator {
                topic: f(*topic)?,
                iri: iri.clone(),
            },
            AddItemIdentifier { construct, iri } => AddItemIdentifier {
                construct: f(*construct)?,
                iri: iri.clone(),
            },
            RemoveItemIdentifier { construct, iri } => RemoveItemIdentifier {
                construct: f(*construct)?,
                iri: iri.clone(),
            },
            MergeTopics { topic, other } => MergeTopics {
                topic: f(*topic)?,
                other: f(*other)?,
            },
            AddType { topic, typing } => AddType {
                topic: f(*topic)?,
                typing: f(*typing)?,
            },
            RemoveType { topic, typing } => RemoveType {
                topic: f(*topic)?,
                typing: f(*typing)?,
            },
            AddSupertype { topic, supertype } => AddSupertype {
                topic: f(*topic)?,
                supertype: f(*supertype)?,
            },
            RemoveSupertype { topic, supertype } => RemoveSupertype {
                topic: f(*topic)?,
                supertype: f(*supertype)?,
            },
            SetType { construct, typing } => SetType {
                construct: f(*construct)?,
                typing: f(*typing)?,
            },
            SetValue { construct, literal } => SetValue {
                construct: f(*construct)?,
                literal: literal.clone(),
            },
            SetPlayer { role, player } => SetPlayer {
                role: f(*role)?,
                player: f(*player)?,
            },
            SetReifier { construct, reifier } => SetReifier {
                construct: f(*construct)?,
                reifier: reifier.map(&mut *f).transpose()?,
            },
            AddTheme { construct, theme } => AddTheme {
                construct: f(*construct)?,
                theme: f(*theme)?,
            },
            RemoveTheme { construct, theme } => RemoveTheme {
                construct: f(*construct)?,
                theme: f(*theme)?,
            },
            RemoveDuplicates { topic } => RemoveDuplicates { topic: f(*topic)? },
            Remove { construct, cascade } => Remove {
                construct: f(*construct)?,
                cascade: *cascade,
            },
        };
        Ok(mapped)
    }
    /// Every construct-valued parameter, in declaration order.
    pub fn ids(&self) -> Vec<Tid> {
        let mut ids = Vec::new();
        self.map_ids(&mut |id| {
            ids.push(id);
            Ok(id)
        })
        .expect("identity mapping cannot fail");
        ids
    }
    /// Feed the canonical byte form of this operation to a hasher, for
    /// command-log digests.
    pub fn hash_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(format!("{self:?}").as_bytes());
        hasher.update(&[0u8]);
    }
}

fn map_all(ids: &[Tid], f: &mut impl FnMut(Tid) -> Result<Tid>) -> Result<Vec<Tid>> {
    ids.iter().map(|id| f(*id)).collect()
}

// ------------- Change notifications -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Removed,
    IdentityAdded,
    IdentityRemoved,
    TypeAdded,
    TypeRemoved,
    TypeChanged,
    SupertypeAdded,
    SupertypeRemoved,
    ValueChanged,
    PlayerChanged,
    ReifierChanged,
    ScopeChanged,
    Merged,
    DuplicatesRemoved,
}

/// One value slot of a change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    None,
    Id(Tid),
    Iri(String),
    Text(String),
    Value(Literal),
    Themes(Vec<Tid>),
}

/// Fired once per successful mutation, before the call returns. A merge
/// triggered by an identity collision additionally fires a [`ChangeKind::Merged`]
/// change whose old datum is the absorbed topic and whose new datum is the
/// survivor; commit replay relies on that pair to remap identities.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub notifier: Tid,
    pub new: Datum,
    pub old: Datum,
}

pub trait Listener: Send + Sync {
    fn notify(&self, change: &Change);
}

pub type ListenerId = u64;

// ------------- Applied -------------
/// The outcome of a successful [`Store::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    /// The construct produced (or adopted) by a create operation.
    pub created: Option<Tid>,
}

impl Applied {
    pub fn none() -> Self {
        Self { created: None }
    }
    pub fn created(id: Tid) -> Self {
        Self { created: Some(id) }
    }
}

// ------------- Store -------------
/// The backend-agnostic contract. Implemented by the in-memory/relational
/// [`crate::database::Database`] and by [`crate::transaction::Transaction`],
/// which is how transactions nest.
pub trait Store {
    /// The id of the topic map construct this store holds.
    fn topic_map(&self) -> Tid;
    /// Apply one mutation, firing change notifications before returning.
    fn apply(&mut self, op: Operation) -> Result<Applied>;
    /// The flat view of one construct. Referenced ids are resolved through
    /// merge redirects. Never mutates store content; the transaction overlay
    /// uses interior mutability for its mirror cache.
    fn snapshot(&self, id: Tid) -> Result<ConstructSnapshot>;
    fn contains(&self, id: Tid) -> bool;
    /// Follow merge redirects: any id a construct ever answered to resolves
    /// to the current survivor.
    fn resolve(&self, id: Tid) -> Tid;
    fn topics(&self) -> Vec<Tid>;
    fn associations(&self) -> Vec<Tid>;
    fn topic_by_subject_identifier(&self, iri: &str) -> Option<Tid>;
    fn topic_by_subject_locator(&self, iri: &str) -> Option<Tid>;
    fn construct_by_item_identifier(&self, iri: &str) -> Option<Tid>;
    /// Typed constructs (associations, roles, names, occurrences) whose type
    /// is the given topic.
    fn constructs_by_type(&self, typing: Tid) -> Vec<Tid>;
    /// Scoped constructs whose scope contains the given theme.
    fn scoped_by_theme(&self, theme: Tid) -> Vec<Tid>;
    /// Associations whose scope contains the given theme.
    fn associations_by_theme(&self, theme: Tid) -> Vec<Tid>;
    fn subscribe(&mut self, listener: Arc<dyn Listener>) -> ListenerId;
    fn unsubscribe(&mut self, listener: ListenerId);
}
