//! Block store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide atomic read/write access to block records and zone bookkeeping.
//! - Apply multi-record batches (renormalization, cross-zone moves) as one
//!   version-checked transaction.
//!
//! # Invariants
//! - Zone listings are deterministic: `position ASC, block_uuid ASC`.
//! - A committed batch never leaves two blocks of one zone on the same
//!   position; such a batch is rolled back with `DuplicatePosition`.
//! - Every committed batch bumps the version of each zone it touched.
//! - A batch commits only if every expected zone version and block
//!   membership still holds.
//! - A failed batch leaves the store exactly as it was.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::block::{Block, BlockId, BlockKind, Zone, ZoneRecord};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const BLOCK_SELECT_SQL: &str = "SELECT
    block_uuid,
    zone,
    position,
    kind,
    content,
    token_estimate
FROM blocks";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from block store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced block does not exist.
    BlockNotFound(BlockId),
    /// Zone was written by someone else since the caller read it.
    VersionConflict {
        zone: Zone,
        expected: u64,
        actual: u64,
    },
    /// Block left the zone the caller read it in.
    BlockMoved {
        id: BlockId,
        expected: Zone,
        actual: Zone,
    },
    /// Batch would leave two blocks on one position.
    DuplicatePosition { zone: Zone, position: f64 },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted or submitted data is not a valid block/zone.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::VersionConflict {
                zone,
                expected,
                actual,
            } => write!(
                f,
                "zone `{zone}` changed concurrently: expected version {expected}, found {actual}"
            ),
            Self::BlockMoved {
                id,
                expected,
                actual,
            } => write!(
                f,
                "block {id} moved concurrently: expected zone `{expected}`, found `{actual}`"
            ),
            Self::DuplicatePosition { zone, position } => {
                write!(f, "zone `{zone}` would hold two blocks at position {position}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "block store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "block store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "block store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid block data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One primitive mutation inside a `WriteBatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Adds a new block at its own zone and position.
    Insert(Block),
    /// Deletes a block.
    Remove(BlockId),
    /// Sets zone and position of an existing block. Covers same-zone
    /// reorders, cross-zone moves and renormalization.
    Place {
        id: BlockId,
        zone: Zone,
        position: f64,
    },
    /// Replaces content and its length estimate.
    UpdateContent {
        id: BlockId,
        content: String,
        token_estimate: u64,
    },
}

/// Ordered list of mutations applied all-or-nothing.
///
/// Zone version expectations turn the batch into an optimistic write: it only
/// commits when none of the expected zones changed since they were read.
/// Block membership expectations pin a block to the zone it was read in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    expected_versions: Vec<(Zone, u64)>,
    expected_zones: Vec<(BlockId, Zone)>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `zone` to still be at `version` at commit time.
    pub fn expect_version(mut self, zone: Zone, version: u64) -> Self {
        if !self.expected_versions.iter().any(|(z, _)| *z == zone) {
            self.expected_versions.push((zone, version));
        }
        self
    }

    /// Requires block `id` to still belong to `zone` at commit time.
    pub fn expect_block_zone(mut self, id: BlockId, zone: Zone) -> Self {
        self.expected_zones.push((id, zone));
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn with(mut self, op: WriteOp) -> Self {
        self.push(op);
        self
    }

    pub fn expected_versions(&self) -> &[(Zone, u64)] {
        &self.expected_versions
    }

    pub fn expected_zones(&self) -> &[(BlockId, Zone)] {
        &self.expected_zones
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Store collaborator used by the ordering engine.
pub trait BlockStore {
    /// Loads budget and version of one zone.
    fn zone(&self, zone: Zone) -> StoreResult<ZoneRecord>;
    /// Lists every block of a zone in ascending position order.
    fn list_zone(&self, zone: Zone) -> StoreResult<Vec<Block>>;
    /// Loads one block by id.
    fn get_block(&self, id: BlockId) -> StoreResult<Option<Block>>;
    /// Sums the token estimates of one zone.
    fn zone_usage(&self, zone: Zone) -> StoreResult<u64>;
    /// Replaces the token budget of one zone.
    fn set_zone_budget(&self, zone: Zone, token_budget: u64) -> StoreResult<()>;
    /// Applies a batch atomically and returns the zones it touched.
    fn apply(&self, batch: &WriteBatch) -> StoreResult<Vec<Zone>>;
}

/// SQLite-backed block store.
pub struct SqliteBlockStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlockStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_block_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl BlockStore for SqliteBlockStore<'_> {
    fn zone(&self, zone: Zone) -> StoreResult<ZoneRecord> {
        load_zone(self.conn, zone)
    }

    fn list_zone(&self, zone: Zone) -> StoreResult<Vec<Block>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BLOCK_SELECT_SQL}
             WHERE zone = ?1
             ORDER BY position ASC, block_uuid ASC;"
        ))?;
        let mut rows = stmt.query([zone.as_str()])?;
        let mut blocks = Vec::new();
        while let Some(row) = rows.next()? {
            blocks.push(parse_block_row(row)?);
        }
        Ok(blocks)
    }

    fn get_block(&self, id: BlockId) -> StoreResult<Option<Block>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BLOCK_SELECT_SQL} WHERE block_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_block_row(row)?));
        }
        Ok(None)
    }

    fn zone_usage(&self, zone: Zone) -> StoreResult<u64> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(token_estimate), 0)
             FROM blocks
             WHERE zone = ?1;",
            [zone.as_str()],
            |row| row.get(0),
        )?;
        u64::try_from(used)
            .map_err(|_| StoreError::InvalidData(format!("negative usage `{used}` in `{zone}`")))
    }

    fn set_zone_budget(&self, zone: Zone, token_budget: u64) -> StoreResult<()> {
        // Budget is not part of the order, so the zone version stays put.
        self.conn.execute(
            "UPDATE zones
             SET token_budget = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE zone = ?1;",
            params![zone.as_str(), to_sql_int(token_budget, "zones.token_budget")?],
        )?;
        Ok(())
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<Vec<Zone>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        for (zone, expected) in batch.expected_versions() {
            let actual = load_zone(&tx, *zone)?.version;
            if actual != *expected {
                return Err(StoreError::VersionConflict {
                    zone: *zone,
                    expected: *expected,
                    actual,
                });
            }
        }

        for (id, expected) in batch.expected_zones() {
            let actual = load_block_zone(&tx, *id)?;
            if actual != *expected {
                return Err(StoreError::BlockMoved {
                    id: *id,
                    expected: *expected,
                    actual,
                });
            }
        }

        let mut touched = BTreeSet::new();
        for op in batch.ops() {
            match op {
                WriteOp::Insert(block) => {
                    ensure_valid_position(block.position)?;
                    insert_block_row(&tx, block)?;
                    touched.insert(block.zone);
                }
                WriteOp::Remove(id) => {
                    let zone = load_block_zone(&tx, *id)?;
                    tx.execute("DELETE FROM blocks WHERE block_uuid = ?1;", [id.to_string()])?;
                    touched.insert(zone);
                }
                WriteOp::Place { id, zone, position } => {
                    ensure_valid_position(*position)?;
                    let previous = load_block_zone(&tx, *id)?;
                    tx.execute(
                        "UPDATE blocks
                         SET zone = ?2,
                             position = ?3,
                             updated_at = (strftime('%s', 'now') * 1000)
                         WHERE block_uuid = ?1;",
                        params![id.to_string(), zone.as_str(), position],
                    )?;
                    touched.insert(previous);
                    touched.insert(*zone);
                }
                WriteOp::UpdateContent {
                    id,
                    content,
                    token_estimate,
                } => {
                    let zone = load_block_zone(&tx, *id)?;
                    tx.execute(
                        "UPDATE blocks
                         SET content = ?2,
                             token_estimate = ?3,
                             updated_at = (strftime('%s', 'now') * 1000)
                         WHERE block_uuid = ?1;",
                        params![
                            id.to_string(),
                            content.as_str(),
                            to_sql_int(*token_estimate, "blocks.token_estimate")?,
                        ],
                    )?;
                    touched.insert(zone);
                }
            }
        }

        for zone in &touched {
            ensure_unique_positions(&tx, *zone)?;
            bump_zone_version(&tx, *zone)?;
        }

        tx.commit()?;
        Ok(touched.into_iter().collect())
    }
}

fn load_zone(conn: &Connection, zone: Zone) -> StoreResult<ZoneRecord> {
    let row: Option<(i64, i64)> = conn
        .query_row(
            "SELECT token_budget, version
             FROM zones
             WHERE zone = ?1;",
            [zone.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (budget, version) =
        row.ok_or_else(|| StoreError::InvalidData(format!("zone `{zone}` is not seeded")))?;
    Ok(ZoneRecord {
        zone,
        token_budget: from_sql_int(budget, "zones.token_budget")?,
        version: from_sql_int(version, "zones.version")?,
    })
}

fn load_block_zone(conn: &Connection, id: BlockId) -> StoreResult<Zone> {
    let zone: Option<String> = conn
        .query_row(
            "SELECT zone FROM blocks WHERE block_uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let zone = zone.ok_or(StoreError::BlockNotFound(id))?;
    parse_zone(&zone)
}

fn insert_block_row(conn: &Connection, block: &Block) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO blocks (
            block_uuid,
            zone,
            position,
            kind,
            content,
            token_estimate
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            block.id.to_string(),
            block.zone.as_str(),
            block.position,
            block.kind.as_str(),
            block.content.as_str(),
            to_sql_int(block.token_estimate, "blocks.token_estimate")?,
        ],
    )?;
    Ok(())
}

fn ensure_unique_positions(conn: &Connection, zone: Zone) -> StoreResult<()> {
    let duplicate: Option<f64> = conn
        .query_row(
            "SELECT position
             FROM blocks
             WHERE zone = ?1
             GROUP BY position
             HAVING COUNT(*) > 1
             LIMIT 1;",
            [zone.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match duplicate {
        Some(position) => Err(StoreError::DuplicatePosition { zone, position }),
        None => Ok(()),
    }
}

fn bump_zone_version(conn: &Connection, zone: Zone) -> StoreResult<()> {
    conn.execute(
        "UPDATE zones
         SET version = version + 1,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE zone = ?1;",
        [zone.as_str()],
    )?;
    Ok(())
}

fn ensure_valid_position(position: f64) -> StoreResult<()> {
    if position.is_finite() && position > 0.0 {
        return Ok(());
    }
    Err(StoreError::InvalidData(format!(
        "position must be finite and positive, got {position}"
    )))
}

fn parse_block_row(row: &Row<'_>) -> StoreResult<Block> {
    let id_text: String = row.get("block_uuid")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid `{id_text}` in blocks.block_uuid"))
    })?;

    let zone_text: String = row.get("zone")?;
    let kind_text: String = row.get("kind")?;
    let kind = BlockKind::parse(&kind_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid block kind `{kind_text}` in blocks.kind"))
    })?;

    Ok(Block {
        id,
        zone: parse_zone(&zone_text)?,
        position: row.get("position")?,
        kind,
        content: row.get("content")?,
        token_estimate: from_sql_int(row.get("token_estimate")?, "blocks.token_estimate")?,
    })
}

fn parse_zone(value: &str) -> StoreResult<Zone> {
    Zone::parse(value)
        .ok_or_else(|| StoreError::InvalidData(format!("invalid zone `{value}` in blocks.zone")))
}

fn from_sql_int(value: i64, column: &'static str) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative value `{value}` in {column}")))
}

fn to_sql_int(value: u64, column: &'static str) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("value `{value}` overflows {column}")))
}

fn ensure_block_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 2] = [
        ("zones", &["zone", "token_budget", "version", "updated_at"]),
        (
            "blocks",
            &[
                "block_uuid",
                "zone",
                "position",
                "kind",
                "content",
                "token_estimate",
                "created_at",
                "updated_at",
            ],
        ),
    ];
    for (table, columns) in required {
        let present = table_columns(conn, table)?;
        if present.is_empty() {
            return Err(StoreError::MissingRequiredTable(table));
        }
        let missing = columns
            .iter()
            .find(|column| !present.iter().any(|p| p.as_str() == **column));
        if let Some(column) = missing {
            return Err(StoreError::MissingRequiredColumn {
                table,
                column: *column,
            });
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
