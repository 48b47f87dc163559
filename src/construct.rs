use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::datatype::Literal;
use crate::error::{Result, TopikaError};
use crate::locator::Locator;
use crate::scope::Scope;

// ------------- Tid -------------
/// A store-assigned construct identity: the upper half is a slot generation,
/// the lower half an arena slot. A stale id (its slot was reclaimed) fails at
/// the point of dereference instead of relying on scattered removed-flags.
pub type Tid = u64;

pub type TidHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

const fn tid(slot: u32, generation: u32) -> Tid {
    ((generation as u64) << 32) | slot as u64
}
const fn slot_of(id: Tid) -> u32 {
    id as u32
}
const fn generation_of(id: Tid) -> u32 {
    (id >> 32) as u32
}

// ------------- Construct kinds -------------
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum Kind {
    TopicMap,
    Topic,
    Association,
    Role,
    Name,
    Occurrence,
    Variant,
}
impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::TopicMap => "topicmap",
            Kind::Topic => "topic",
            Kind::Association => "association",
            Kind::Role => "role",
            Kind::Name => "name",
            Kind::Occurrence => "occurrence",
            Kind::Variant => "variant",
        }
    }
    pub fn from_str(s: &str) -> Result<Kind> {
        Ok(match s {
            "topicmap" => Kind::TopicMap,
            "topic" => Kind::Topic,
            "association" => Kind::Association,
            "role" => Kind::Role,
            "name" => Kind::Name,
            "occurrence" => Kind::Occurrence,
            "variant" => Kind::Variant,
            other => {
                return Err(TopikaError::Persistence(format!(
                    "unknown construct kind '{other}'"
                )));
            }
        })
    }
}
impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ------------- Bodies -------------
// One record per concrete kind; the capability fields (reifier, scope,
// typing) are plain struct members rather than an inheritance chain.

pub type ScopeRef = Arc<Scope>;

#[derive(Debug, Default)]
pub struct TopicMapBody {
    pub reifier: Option<Tid>,
}

#[derive(Debug, Default)]
pub struct TopicBody {
    pub subject_identifiers: HashSet<Arc<Locator>, OtherHasher>,
    pub subject_locators: HashSet<Arc<Locator>, OtherHasher>,
    pub types: HashSet<Tid, TidHasher>,
    pub supertypes: HashSet<Tid, TidHasher>,
    pub names: HashSet<Tid, TidHasher>,
    pub occurrences: HashSet<Tid, TidHasher>,
    pub roles_played: HashSet<Tid, TidHasher>,
    /// The construct this topic reifies, if any.
    pub reified: Option<Tid>,
}

#[derive(Debug)]
pub struct AssociationBody {
    pub typing: Tid,
    pub scope: ScopeRef,
    pub reifier: Option<Tid>,
    pub roles: HashSet<Tid, TidHasher>,
}

#[derive(Debug)]
pub struct RoleBody {
    pub typing: Tid,
    pub player: Tid,
    pub reifier: Option<Tid>,
}

#[derive(Debug)]
pub struct NameBody {
    pub typing: Tid,
    pub value: String,
    pub scope: ScopeRef,
    pub reifier: Option<Tid>,
    pub variants: HashSet<Tid, TidHasher>,
}

#[derive(Debug)]
pub struct OccurrenceBody {
    pub typing: Tid,
    pub literal: Literal,
    pub scope: ScopeRef,
    pub reifier: Option<Tid>,
}

#[derive(Debug)]
pub struct VariantBody {
    pub literal: Literal,
    pub scope: ScopeRef,
    pub reifier: Option<Tid>,
}

#[derive(Debug)]
pub enum Body {
    TopicMap(TopicMapBody),
    Topic(TopicBody),
    Association(AssociationBody),
    Role(RoleBody),
    Name(NameBody),
    Occurrence(OccurrenceBody),
    Variant(VariantBody),
}

impl Body {
    pub fn kind(&self) -> Kind {
        match self {
            Body::TopicMap(_) => Kind::TopicMap,
            Body::Topic(_) => Kind::Topic,
            Body::Association(_) => Kind::Association,
            Body::Role(_) => Kind::Role,
            Body::Name(_) => Kind::Name,
            Body::Occurrence(_) => Kind::Occurrence,
            Body::Variant(_) => Kind::Variant,
        }
    }
    pub fn reifier(&self) -> Option<Tid> {
        match self {
            Body::TopicMap(b) => b.reifier,
            Body::Topic(_) => None,
            Body::Association(b) => b.reifier,
            Body::Role(b) => b.reifier,
            Body::Name(b) => b.reifier,
            Body::Occurrence(b) => b.reifier,
            Body::Variant(b) => b.reifier,
        }
    }
    pub fn set_reifier(&mut self, reifier: Option<Tid>) -> Result<()> {
        match self {
            Body::TopicMap(b) => b.reifier = reifier,
            Body::Association(b) => b.reifier = reifier,
            Body::Role(b) => b.reifier = reifier,
            Body::Name(b) => b.reifier = reifier,
            Body::Occurrence(b) => b.reifier = reifier,
            Body::Variant(b) => b.reifier = reifier,
            Body::Topic(_) => {
                return Err(TopikaError::Constraint(
                    "a topic cannot itself be reified".to_owned(),
                ));
            }
        }
        Ok(())
    }
    pub fn scope(&self) -> Option<&ScopeRef> {
        match self {
            Body::Association(b) => Some(&b.scope),
            Body::Name(b) => Some(&b.scope),
            Body::Occurrence(b) => Some(&b.scope),
            Body::Variant(b) => Some(&b.scope),
            _ => None,
        }
    }
    pub fn set_scope(&mut self, scope: ScopeRef) -> Result<()> {
        match self {
            Body::Association(b) => b.scope = scope,
            Body::Name(b) => b.scope = scope,
            Body::Occurrence(b) => b.scope = scope,
            Body::Variant(b) => b.scope = scope,
            _ => {
                return Err(TopikaError::Constraint(format!(
                    "{} constructs are not scoped",
                    self.kind()
                )));
            }
        }
        Ok(())
    }
    pub fn typing(&self) -> Option<Tid> {
        match self {
            Body::Association(b) => Some(b.typing),
            Body::Role(b) => Some(b.typing),
            Body::Name(b) => Some(b.typing),
            Body::Occurrence(b) => Some(b.typing),
            _ => None,
        }
    }
    pub fn set_typing(&mut self, typing: Tid) -> Result<()> {
        match self {
            Body::Association(b) => b.typing = typing,
            Body::Role(b) => b.typing = typing,
            Body::Name(b) => b.typing = typing,
            Body::Occurrence(b) => b.typing = typing,
            _ => {
                return Err(TopikaError::Constraint(format!(
                    "{} constructs are not typed",
                    self.kind()
                )));
            }
        }
        Ok(())
    }
}

// ------------- Construct -------------
#[derive(Debug)]
pub struct Construct {
    pub id: Tid,
    pub parent: Option<Tid>,
    pub item_identifiers: HashSet<Arc<Locator>, OtherHasher>,
    pub body: Body,
}

impl Construct {
    pub fn new(id: Tid, parent: Option<Tid>, body: Body) -> Self {
        Self {
            id,
            parent,
            item_identifiers: HashSet::default(),
            body,
        }
    }
    pub fn kind(&self) -> Kind {
        self.body.kind()
    }
    pub fn topic(&self) -> Result<&TopicBody> {
        match &self.body {
            Body::Topic(b) => Ok(b),
            _ => Err(TopikaError::Constraint(format!(
                "construct {} is a {}, not a topic",
                self.id,
                self.kind()
            ))),
        }
    }
    pub fn topic_mut(&mut self) -> Result<&mut TopicBody> {
        match &mut self.body {
            Body::Topic(b) => Ok(b),
            _ => Err(TopikaError::Constraint(format!(
                "construct {} is not a topic",
                self.id
            ))),
        }
    }
}

// ------------- Snapshots -------------
// The flat, owned view of one construct that crosses the storage contract:
// mirroring, persistence and export all read these instead of the arena.

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotBody {
    TopicMap {
        reifier: Option<Tid>,
    },
    Topic {
        subject_identifiers: Vec<String>,
        subject_locators: Vec<String>,
        types: Vec<Tid>,
        supertypes: Vec<Tid>,
        names: Vec<Tid>,
        occurrences: Vec<Tid>,
        roles_played: Vec<Tid>,
        reified: Option<Tid>,
    },
    Association {
        typing: Tid,
        themes: Vec<Tid>,
        reifier: Option<Tid>,
        roles: Vec<Tid>,
    },
    Role {
        typing: Tid,
        player: Tid,
        reifier: Option<Tid>,
    },
    Name {
        typing: Tid,
        value: String,
        themes: Vec<Tid>,
        reifier: Option<Tid>,
        variants: Vec<Tid>,
    },
    Occurrence {
        typing: Tid,
        literal: Literal,
        themes: Vec<Tid>,
        reifier: Option<Tid>,
    },
    Variant {
        literal: Literal,
        themes: Vec<Tid>,
        reifier: Option<Tid>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructSnapshot {
    pub id: Tid,
    pub parent: Option<Tid>,
    pub item_identifiers: Vec<String>,
    pub body: SnapshotBody,
}

impl ConstructSnapshot {
    pub fn kind(&self) -> Kind {
        match self.body {
            SnapshotBody::TopicMap { .. } => Kind::TopicMap,
            SnapshotBody::Topic { .. } => Kind::Topic,
            SnapshotBody::Association { .. } => Kind::Association,
            SnapshotBody::Role { .. } => Kind::Role,
            SnapshotBody::Name { .. } => Kind::Name,
            SnapshotBody::Occurrence { .. } => Kind::Occurrence,
            SnapshotBody::Variant { .. } => Kind::Variant,
        }
    }
}

pub(crate) fn sorted_ids(set: &HashSet<Tid, TidHasher>) -> Vec<Tid> {
    let mut ids: Vec<Tid> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

pub(crate) fn sorted_references(set: &HashSet<Arc<Locator>, OtherHasher>) -> Vec<String> {
    let mut refs: Vec<String> = set.iter().map(|l| l.reference().to_owned()).collect();
    refs.sort_unstable();
    refs
}

pub(crate) fn sorted_themes(scope: &Scope) -> Vec<Tid> {
    scope.themes().iter().copied().collect()
}

// ------------- Arena -------------
/// Generational slot arena holding every construct of one store. Removal
/// bumps the slot generation, so ids held across a removal dereference to
/// [`TopikaError::Removed`] rather than to a recycled construct.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
}

#[derive(Debug)]
struct ArenaSlot {
    generation: u32,
    body: Option<Construct>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }
    /// Reserve a fresh id. The slot stays empty until [`Self::install`]; a
    /// reserved-but-empty id dereferences like a removed one.
    pub fn allocate(&mut self) -> Tid {
        if let Some(slot) = self.free.pop() {
            let generation = self.slots[slot as usize].generation.max(1);
            self.slots[slot as usize].generation = generation;
            tid(slot, generation)
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(ArenaSlot {
                generation: 1,
                body: None,
            });
            tid(slot, 1)
        }
    }
    pub fn install(&mut self, construct: Construct) {
        let slot = slot_of(construct.id) as usize;
        debug_assert_eq!(self.slots[slot].generation, generation_of(construct.id));
        self.slots[slot].body = Some(construct);
    }
    pub fn insert(&mut self, parent: Option<Tid>, body: Body) -> Tid {
        let id = self.allocate();
        self.install(Construct::new(id, parent, body));
        id
    }
    fn slot(&self, id: Tid) -> Option<&ArenaSlot> {
        let slot = self.slots.get(slot_of(id) as usize)?;
        (slot.generation == generation_of(id)).then_some(slot)
    }
    pub fn contains(&self, id: Tid) -> bool {
        self.slot(id).map(|s| s.body.is_some()).unwrap_or(false)
    }
    pub fn get(&self, id: Tid) -> Result<&Construct> {
        self.slot(id)
            .and_then(|s| s.body.as_ref())
            .ok_or(TopikaError::Removed(id))
    }
    pub fn get_mut(&mut self, id: Tid) -> Result<&mut Construct> {
        let generation = generation_of(id);
        self.slots
            .get_mut(slot_of(id) as usize)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.body.as_mut())
            .ok_or(TopikaError::Removed(id))
    }
    /// Remove a construct, invalidating every outstanding copy of its id.
    pub fn remove(&mut self, id: Tid) -> Result<Construct> {
        let generation = generation_of(id);
        let slot = self
            .slots
            .get_mut(slot_of(id) as usize)
            .filter(|s| s.generation == generation)
            .ok_or(TopikaError::Removed(id))?;
        let construct = slot.body.take().ok_or(TopikaError::Removed(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(slot_of(id));
        Ok(construct)
    }
    /// Re-seat a construct restored from persistence under its original id.
    pub fn restore(&mut self, construct: Construct) {
        let slot = slot_of(construct.id) as usize;
        while self.slots.len() <= slot {
            self.slots.push(ArenaSlot {
                generation: 0,
                body: None,
            });
        }
        self.slots[slot].generation = generation_of(construct.id);
        self.slots[slot].body = Some(construct);
    }
    /// Rebuild the free list after a restore pass.
    pub fn seal_restore(&mut self) {
        self.free.clear();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.body.is_none() {
                self.free.push(i as u32);
            }
        }
    }
    pub fn iter(&self) -> impl Iterator<Item = &Construct> {
        self.slots.iter().filter_map(|s| s.body.as_ref())
    }
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.body.is_some()).count()
    }
}

// scope themes are kept ordered so interning and persistence are deterministic
pub type ThemeSet = BTreeSet<Tid>;
