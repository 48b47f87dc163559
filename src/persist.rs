// used for persistence
use rusqlite::{Connection, params};

use tracing::debug;

use crate::construct::Tid;
use crate::error::Result;

/// One construct as it sits in the Construct table. Structural sets (names,
/// roles, played roles, variants) are derived from the Parent and Player
/// columns on restore instead of being stored redundantly.
#[derive(Debug, Clone)]
pub struct ConstructRow {
    pub id: Tid,
    pub kind: String,
    pub parent: Option<Tid>,
    pub typing: Option<Tid>,
    pub player: Option<Tid>,
    pub value: Option<String>,
    pub datatype: Option<String>,
    pub reifier: Option<Tid>,
}

// ------------- Persistence -------------
/// Write-through SQLite persistence. Every mutation lands here as it
/// happens; on open the whole graph is read back. Each write also extends a
/// blake3 hash chain kept in the Ledger table, so tampering with the stored
/// rows is detectable by comparing superhashes.
pub struct Persistor {
    db: Connection,
    superhash: Option<blake3::Hash>,
}

impl Persistor {
    pub fn open(path: &str) -> Result<Persistor> {
        let connection = Connection::open(path)?;
        connection.execute_batch(
            "
            create table if not exists Construct (
                Construct_Identity integer not null,
                Kind text not null,
                Parent integer null,
                Type integer null,
                Player integer null,
                Value text null,
                Datatype text null,
                Reifier integer null,
                constraint referenceable_Construct_Identity primary key (
                    Construct_Identity
                )
            );
            create table if not exists Locator (
                Locator_Identity integer not null,
                Reference text not null,
                constraint referenceable_Locator_Identity primary key (
                    Locator_Identity
                ),
                constraint unique_Reference unique (
                    Reference
                )
            );
            create table if not exists Identifier (
                Locator_Identity integer not null,
                Construct_Identity integer not null,
                Kind text not null,
                constraint Identifier_is_Locator foreign key (
                    Locator_Identity
                ) references Locator(Locator_Identity),
                constraint one_construct_per_identifier primary key (
                    Locator_Identity,
                    Kind
                )
            );
            create table if not exists TopicType (
                Topic_Identity integer not null,
                Type_Identity integer not null,
                Kind text not null,
                constraint unique_TopicType primary key (
                    Topic_Identity,
                    Type_Identity,
                    Kind
                )
            );
            create table if not exists Theme (
                Construct_Identity integer not null,
                Theme_Identity integer not null,
                constraint unique_Theme primary key (
                    Construct_Identity,
                    Theme_Identity
                )
            );
            create table if not exists Ledger (
                Ledger_Sequence integer primary key autoincrement,
                Superhash blob not null
            );
            ",
        )?;
        let superhash = connection
            .query_row(
                "select Superhash from Ledger order by Ledger_Sequence desc limit 1",
                [],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .map(|bytes| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes[..32]);
                Some(blake3::Hash::from(hash))
            })
            .unwrap_or(None);
        Ok(Persistor {
            db: connection,
            superhash,
        })
    }
    pub fn is_empty(&mut self) -> Result<bool> {
        let count: i64 = self
            .db
            .query_row("select count(*) from Construct", [], |row| row.get(0))?;
        Ok(count == 0)
    }
    /// Extend the hash chain with one mutation description and append the
    /// new head to the ledger.
    fn chain(&mut self, description: &str) -> Result<()> {
        let mut hasher = blake3::Hasher::new();
        if let Some(previous) = &self.superhash {
            hasher.update(previous.as_bytes());
        }
        hasher.update(description.as_bytes());
        let head = hasher.finalize();
        self.db.execute(
            "insert into Ledger (Superhash) values (?)",
            params![head.as_bytes().as_slice()],
        )?;
        self.superhash = Some(head);
        Ok(())
    }
    pub fn current_superhash(&self) -> Option<String> {
        self.superhash.as_ref().map(|h| h.to_hex().to_string())
    }

    // ------------- Adders -------------
    pub fn persist_construct(&mut self, row: &ConstructRow) -> Result<()> {
        self.db
            .prepare_cached(
                "
            insert or replace into Construct (
                Construct_Identity,
                Kind,
                Parent,
                Type,
                Player,
                Value,
                Datatype,
                Reifier
            ) values (?, ?, ?, ?, ?, ?, ?, ?)
        ",
            )?
            .execute(params![
                row.id,
                row.kind,
                row.parent,
                row.typing,
                row.player,
                row.value,
                row.datatype,
                row.reifier
            ])?;
        self.chain(&format!("construct:{}:{}", row.id, row.kind))
    }
    pub fn delete_construct(&mut self, id: Tid) -> Result<()> {
        self.db
            .prepare_cached("delete from Construct where Construct_Identity = ?")?
            .execute(params![id])?;
        self.db
            .prepare_cached("delete from Identifier where Construct_Identity = ?")?
            .execute(params![id])?;
        self.db
            .prepare_cached("delete from TopicType where Topic_Identity = ?")?
            .execute(params![id])?;
        self.db
            .prepare_cached("delete from Theme where Construct_Identity = ?")?
            .execute(params![id])?;
        self.chain(&format!("delete:{id}"))
    }
    pub fn persist_locator(&mut self, cid: u64, reference: &str) -> Result<()> {
        self.db
            .prepare_cached(
                "insert or ignore into Locator (Locator_Identity, Reference) values (?, ?)",
            )?
            .execute(params![cid, reference])?;
        Ok(())
    }
    pub fn persist_identifier(&mut self, cid: u64, construct: Tid, kind: &str) -> Result<()> {
        self.db
            .prepare_cached(
                "
            insert or replace into Identifier (
                Locator_Identity,
                Construct_Identity,
                Kind
            ) values (?, ?, ?)
        ",
            )?
            .execute(params![cid, construct, kind])?;
        self.chain(&format!("identifier:{cid}:{construct}:{kind}"))
    }
    pub fn delete_identifier(&mut self, cid: u64, kind: &str) -> Result<()> {
        self.db
            .prepare_cached("delete from Identifier where Locator_Identity = ? and Kind = ?")?
            .execute(params![cid, kind])?;
        self.chain(&format!("unbind:{cid}:{kind}"))
    }
    pub fn persist_topic_type(&mut self, topic: Tid, typing: Tid, kind: &str) -> Result<()> {
        self.db
            .prepare_cached(
                "
            insert or ignore into TopicType (
                Topic_Identity,
                Type_Identity,
                Kind
            ) values (?, ?, ?)
        ",
            )?
            .execute(params![topic, typing, kind])?;
        self.chain(&format!("topictype:{topic}:{typing}:{kind}"))
    }
    pub fn delete_topic_type(&mut self, topic: Tid, typing: Tid, kind: &str) -> Result<()> {
        self.db
            .prepare_cached(
                "delete from TopicType where Topic_Identity = ? and Type_Identity = ? and Kind = ?",
            )?
            .execute(params![topic, typing, kind])?;
        self.chain(&format!("untype:{topic}:{typing}:{kind}"))
    }
    pub fn replace_themes(&mut self, construct: Tid, themes: &[Tid]) -> Result<()> {
        self.db
            .prepare_cached("delete from Theme where Construct_Identity = ?")?
            .execute(params![construct])?;
        for theme in themes {
            self.db
                .prepare_cached(
                    "insert into Theme (Construct_Identity, Theme_Identity) values (?, ?)",
                )?
                .execute(params![construct, theme])?;
        }
        Ok(())
    }
    /// Rewrite every stored reference to an absorbed topic. Set-based
    /// updates keep this independent of how much the loser was used.
    pub fn persist_merge(&mut self, loser: Tid, survivor: Tid) -> Result<()> {
        debug!(loser, survivor, "persisting merge");
        self.db.execute(
            "update Construct set Type = ?1 where Type = ?2",
            params![survivor, loser],
        )?;
        self.db.execute(
            "update Construct set Player = ?1 where Player = ?2",
            params![survivor, loser],
        )?;
        self.db.execute(
            "update Construct set Reifier = ?1 where Reifier = ?2",
            params![survivor, loser],
        )?;
        self.db.execute(
            "update Construct set Parent = ?1 where Parent = ?2",
            params![survivor, loser],
        )?;
        self.db.execute(
            "update Identifier set Construct_Identity = ?1 where Construct_Identity = ?2",
            params![survivor, loser],
        )?;
        // primary keys can collide where the survivor already carries the
        // same row; rewrite what can move and drop the rest
        self.db.execute(
            "update or ignore TopicType set Topic_Identity = ?1 where Topic_Identity = ?2",
            params![survivor, loser],
        )?;
        self.db.execute(
            "delete from TopicType where Topic_Identity = ?",
            params![loser],
        )?;
        self.db.execute(
            "update or ignore TopicType set Type_Identity = ?1 where Type_Identity = ?2",
            params![survivor, loser],
        )?;
        self.db.execute(
            "delete from TopicType where Type_Identity = ?",
            params![loser],
        )?;
        self.db.execute(
            "update or ignore Theme set Theme_Identity = ?1 where Theme_Identity = ?2",
            params![survivor, loser],
        )?;
        self.db
            .execute("delete from Theme where Theme_Identity = ?", params![loser])?;
        self.db.execute(
            "delete from Construct where Construct_Identity = ?",
            params![loser],
        )?;
        self.chain(&format!("merge:{loser}:{survivor}"))
    }

    // ------------- Get everything for all constructs -------------
    pub fn all_locators(&mut self) -> Result<Vec<(u64, String)>> {
        let mut statement = self
            .db
            .prepare_cached("select Locator_Identity, Reference from Locator")?;
        let rows = statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
    pub fn all_constructs(&mut self) -> Result<Vec<ConstructRow>> {
        let mut statement = self.db.prepare_cached(
            "
            select Construct_Identity, Kind, Parent, Type, Player, Value, Datatype, Reifier
                from Construct
        ",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok(ConstructRow {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    parent: row.get(2)?,
                    typing: row.get(3)?,
                    player: row.get(4)?,
                    value: row.get(5)?,
                    datatype: row.get(6)?,
                    reifier: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
    pub fn all_identifiers(&mut self) -> Result<Vec<(u64, Tid, String)>> {
        let mut statement = self
            .db
            .prepare_cached("select Locator_Identity, Construct_Identity, Kind from Identifier")?;
        let rows = statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
    pub fn all_topic_types(&mut self) -> Result<Vec<(Tid, Tid, String)>> {
        let mut statement = self
            .db
            .prepare_cached("select Topic_Identity, Type_Identity, Kind from TopicType")?;
        let rows = statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
    pub fn all_themes(&mut self) -> Result<Vec<(Tid, Tid)>> {
        let mut statement = self
            .db
            .prepare_cached("select Construct_Identity, Theme_Identity from Theme")?;
        let rows = statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
