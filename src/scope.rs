//! The scope engine: owns the identity of theme sets.
//!
//! Scopes are interned the same way appearance sets are deduplicated in a
//! keeper: two scope objects with identical theme sets are the same `Arc`.
//! The keeper also maintains the theme -> scope reverse index used both for
//! scoped-construct queries and for theme substitution when topics merge.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::debug;

use crate::construct::{OtherHasher, ThemeSet, Tid, TidHasher};

// ------------- Scope -------------
/// An identity-bearing, unordered set of theme topics. The sid is assigned by
/// the keeper and excluded from equality; equality is the theme set alone.
#[derive(Eq, Debug)]
pub struct Scope {
    sid: u64,
    themes: ThemeSet,
}

impl Scope {
    fn new(sid: u64, themes: ThemeSet) -> Self {
        Self { sid, themes }
    }
    pub fn sid(&self) -> u64 {
        self.sid
    }
    pub fn themes(&self) -> &ThemeSet {
        &self.themes
    }
    pub fn is_unconstrained(&self) -> bool {
        self.themes.is_empty()
    }
    pub fn contains(&self, theme: Tid) -> bool {
        self.themes.contains(&theme)
    }
}
impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.themes == other.themes
    }
}
impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.themes.hash(state);
    }
}
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for t in &self.themes {
            s += &(t.to_string() + ",");
        }
        s.pop();
        write!(f, "{{{s}}}")
    }
}

// ------------- ScopeKeeper -------------
#[derive(Debug)]
pub struct ScopeKeeper {
    kept: HashSet<Arc<Scope>, OtherHasher>,
    by_sid: HashMap<u64, Arc<Scope>, TidHasher>,
    by_theme: HashMap<Tid, HashSet<u64, TidHasher>, TidHasher>,
    empty: Arc<Scope>,
    next_sid: u64,
}

impl ScopeKeeper {
    pub fn new() -> Self {
        let empty = Arc::new(Scope::new(0, ThemeSet::new()));
        let mut kept: HashSet<Arc<Scope>, OtherHasher> = HashSet::default();
        kept.insert(Arc::clone(&empty));
        let mut by_sid: HashMap<u64, Arc<Scope>, TidHasher> = HashMap::default();
        by_sid.insert(0, Arc::clone(&empty));
        Self {
            kept,
            by_sid,
            by_theme: HashMap::default(),
            empty,
            next_sid: 0,
        }
    }
    /// The distinguished scope with no themes.
    pub fn unconstrained(&self) -> Arc<Scope> {
        Arc::clone(&self.empty)
    }
    /// Return the unique scope object for an exact theme set, creating and
    /// registering it if it does not yet exist.
    pub fn scope_of(&mut self, themes: ThemeSet) -> (Arc<Scope>, bool) {
        if themes.is_empty() {
            return (Arc::clone(&self.empty), true);
        }
        let keepsake = Arc::new(Scope::new(self.next_sid + 1, themes));
        if let Some(kept) = self.kept.get(&keepsake) {
            return (Arc::clone(kept), true);
        }
        self.next_sid += 1;
        for theme in keepsake.themes() {
            self.by_theme
                .entry(*theme)
                .or_default()
                .insert(keepsake.sid());
        }
        self.by_sid.insert(keepsake.sid(), Arc::clone(&keepsake));
        self.kept.insert(Arc::clone(&keepsake));
        (keepsake, false)
    }
    pub fn lookup(&self, sid: u64) -> Option<Arc<Scope>> {
        self.by_sid.get(&sid).map(Arc::clone)
    }
    /// All known scopes containing at least one (`match_all == false`) or all
    /// (`match_all == true`) of the given themes.
    pub fn scopes_containing(&self, themes: &[Tid], match_all: bool) -> Vec<Arc<Scope>> {
        let mut sids: HashSet<u64, TidHasher> = HashSet::default();
        for theme in themes {
            if let Some(found) = self.by_theme.get(theme) {
                sids.extend(found.iter().copied());
            }
        }
        let mut scopes: Vec<Arc<Scope>> = sids
            .into_iter()
            .filter_map(|sid| self.by_sid.get(&sid))
            .filter(|scope| !match_all || themes.iter().all(|t| scope.contains(*t)))
            .map(Arc::clone)
            .collect();
        scopes.sort_by_key(|s| s.sid());
        scopes
    }
    pub fn scopes_with_theme(&self, theme: Tid) -> Vec<Arc<Scope>> {
        self.scopes_containing(&[theme], true)
    }
    fn unregister(&mut self, scope: &Arc<Scope>) {
        self.kept.remove(scope);
        self.by_sid.remove(&scope.sid());
        for theme in scope.themes() {
            if let Some(sids) = self.by_theme.get_mut(theme) {
                sids.remove(&scope.sid());
                if sids.is_empty() {
                    self.by_theme.remove(theme);
                }
            }
        }
    }
    /// Rewrite every scope so that `old` no longer appears as a theme. When
    /// `new` is `Some`, occurrences of `old` are replaced by the survivor of a
    /// merge; when `None`, the theme is dropped outright (cascade removal).
    ///
    /// Rewriting can make two previously distinct scopes structurally
    /// identical; the re-interning below consolidates them into one surviving
    /// object. Runs to a fixed point: the pass repeats until no registered
    /// scope mentions `old` any more.
    pub fn substitute_theme(&mut self, old: Tid, new: Option<Tid>) -> Vec<(Arc<Scope>, Arc<Scope>)> {
        let mut remap = Vec::new();
        loop {
            let affected = self.scopes_with_theme(old);
            if affected.is_empty() {
                break;
            }
            for scope in affected {
                let mut themes = scope.themes().clone();
                themes.remove(&old);
                if let Some(survivor) = new {
                    themes.insert(survivor);
                }
                self.unregister(&scope);
                let (target, consolidated) = self.scope_of(themes);
                if consolidated {
                    debug!(old = %scope, target = %target, "consolidated scopes");
                }
                remap.push((scope, target));
            }
        }
        remap
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}
