// used to keep the one-to-one mapping between interned locators and their correlation ids
use bimap::BiMap;

use lazy_static::lazy_static;
use regex::Regex;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Result, TopikaError};

lazy_static! {
    // scheme ":" hier-part, per RFC 3987; anything scheme-less is relative and rejected
    static ref ABSOLUTE_IRI: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:\S+$").unwrap();
}

/// Percent-decoding applied once, on construction, so that locators which
/// differ only in escaping compare equal. Sequences that do not form valid
/// UTF-8 after decoding are left in their escaped form.
fn percent_decode(reference: &str) -> String {
    let bytes = reference.as_bytes();
    let mut decoded: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &reference[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded).unwrap_or_else(|_| reference.to_owned())
}

// ------------- Locator -------------
/// An absolute IRI, compared by its decoded reference string. The correlation
/// id is assigned by the keeper and is deliberately excluded from equality,
/// the same way a role's identity is separate from its name.
#[derive(Eq, Debug)]
pub struct Locator {
    cid: u64,
    reference: String,
}

impl Locator {
    fn new(cid: u64, reference: String) -> Self {
        Self { cid, reference }
    }
    pub fn cid(&self) -> u64 {
        self.cid
    }
    pub fn reference(&self) -> &str {
        &self.reference
    }
    /// Normalize a raw IRI: validate that it is absolute, then percent-decode.
    pub fn normalize(iri: &str) -> Result<String> {
        if !ABSOLUTE_IRI.is_match(iri) {
            return Err(TopikaError::Constraint(format!(
                "'{iri}' is not an absolute IRI"
            )));
        }
        Ok(percent_decode(iri))
    }
}
impl PartialEq for Locator {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}
impl Hash for Locator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}
impl Ord for Locator {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reference.cmp(&other.reference)
    }
}
impl PartialOrd for Locator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}

// ------------- LocatorKeeper -------------
#[derive(Debug)]
pub struct LocatorKeeper {
    kept: BiMap<Arc<Locator>, u64>,
    next_cid: u64,
}
impl LocatorKeeper {
    pub fn new() -> Self {
        Self {
            kept: BiMap::new(),
            next_cid: 0,
        }
    }
    /// Intern a raw IRI, normalizing it first. Returns the canonical locator
    /// and whether it was previously kept.
    pub fn keep(&mut self, iri: &str) -> Result<(Arc<Locator>, bool)> {
        let reference = Locator::normalize(iri)?;
        let probe = Arc::new(Locator::new(self.next_cid + 1, reference));
        if let Some(kept) = self.kept.get_by_left(&probe) {
            let cid = *kept;
            return Ok((Arc::clone(self.kept.get_by_right(&cid).unwrap()), true));
        }
        self.next_cid += 1;
        self.kept.insert(Arc::clone(&probe), self.next_cid);
        Ok((probe, false))
    }
    /// Re-register a locator restored from persistence, keeping its old cid.
    pub fn restore(&mut self, cid: u64, reference: String) -> Arc<Locator> {
        let locator = Arc::new(Locator::new(cid, reference));
        self.kept.insert(Arc::clone(&locator), cid);
        if cid > self.next_cid {
            self.next_cid = cid;
        }
        locator
    }
    /// Look up an already interned locator without creating it.
    pub fn get(&self, iri: &str) -> Option<Arc<Locator>> {
        let reference = Locator::normalize(iri).ok()?;
        let probe = Arc::new(Locator::new(0, reference));
        self.kept
            .get_by_left(&probe)
            .and_then(|cid| self.kept.get_by_right(cid))
            .map(Arc::clone)
    }
    pub fn lookup(&self, cid: u64) -> Option<Arc<Locator>> {
        self.kept.get_by_right(&cid).map(Arc::clone)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Locator>> {
        self.kept.left_values()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}
