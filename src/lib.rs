//! Topika – a Topic Maps data-model engine.
//!
//! Topika stores a graph of typed, scoped, reifiable constructs under the
//! Topic Maps data model and enforces its identity and merging rules:
//! * A [`construct::Tid`] is an opaque construct identity (a generational `u64`).
//! * A [`locator::Locator`] is a normalized absolute IRI; subject
//!   identifiers, subject locators and item identifiers are all locators.
//! * A [`scope::Scope`] is an interned, identity-bearing set of theme topics.
//! * Topics, associations, roles, names, occurrences and variants are the
//!   construct kinds of [`construct::Body`], composed from capability fields
//!   (reifier, scope, type) rather than an inheritance chain.
//!
//! The engine's centerpiece is the pair of rules that keep "same subject,
//! same topic" true as data is added: subject-identifier and subject-locator
//! collisions merge topics (never reject), and merging a theme topic
//! rewrites and consolidates every scope that carried it.
//!
//! ## Modules
//! * [`construct`] – construct kinds, capability records and the slot arena.
//! * [`locator`] – IRI normalization and the locator keeper.
//! * [`datatype`] – typed literals and their coercion accessors.
//! * [`scope`] – the scope engine (interning, containment queries, theme
//!   substitution with cascading consolidation).
//! * [`identity`] – the locator maps, merge redirects and the merge engine.
//! * [`store`] – the storage contract: [`store::Operation`],
//!   [`store::Change`] notifications and the [`store::Store`] trait.
//! * [`database`] – the in-memory store, optionally write-through persisted.
//! * [`transaction`] – the transaction overlay: mirroring, command log,
//!   replay-with-resolution on commit.
//! * [`persist`] – SQLite persistence & restoration layer.
//! * [`jtm`] – JTM 1.0 export.
//!
//! ## Quick Start
//! ```
//! use topika::database::{Database, PersistenceMode};
//! use topika::store::{Operation, Store, TopicSeed};
//! let mut db = Database::new(PersistenceMode::InMemory).unwrap();
//! let map = db.topic_map();
//! let a = db
//!     .apply(Operation::CreateTopic {
//!         map,
//!         seed: TopicSeed::SubjectIdentifier("http://example.org/a".into()),
//!     })
//!     .unwrap()
//!     .created
//!     .unwrap();
//! let b = db
//!     .apply(Operation::CreateTopic {
//!         map,
//!         seed: TopicSeed::SubjectIdentifier("http://example.org/b".into()),
//!     })
//!     .unwrap()
//!     .created
//!     .unwrap();
//! // binding a's subject identifier to b merges the two topics
//! db.apply(Operation::AddSubjectIdentifier {
//!     topic: b,
//!     iri: "http://example.org/a".into(),
//! })
//! .unwrap();
//! assert_eq!(db.resolve(a), db.resolve(b));
//! ```
//!
//! ## Persistence
//! [`database::PersistenceMode::File`] wires the store to a SQLite-backed
//! [`persist::Persistor`] that writes through every mutation, keeps a
//! blake3 ledger of them, and restores the full graph on open.
//!
//! ## Transactions
//! [`transaction::Transaction::begin`] wraps any [`store::Store`] in an
//! isolated workspace; see the module docs for the mirroring and commit
//! semantics. Transactions nest, since the overlay is itself a store.

pub mod construct;
pub mod database;
pub mod datatype;
pub mod error;
pub mod identity;
pub mod jtm;
pub mod locator;
pub mod persist;
pub mod scope;
pub mod store;
pub mod transaction;
