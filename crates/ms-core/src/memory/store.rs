//! Memory storage implementation using SQLite

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, warn};

use crate::memory::Memory;
use crate::{Error, Result};

const IN_MEMORY_DSN: &str = ":memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        memory_id TEXT NOT NULL,
        version INTEGER NOT NULL,
        content TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        archived INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_memories_memory_id ON memories(memory_id);
    CREATE INDEX IF NOT EXISTS idx_memories_archived ON memories(archived);
";

const SELECT_MEMORY: &str =
    "SELECT id, memory_id, version, content, tags, archived, created_at, updated_at FROM memories";

/// Timestamp layouts written by earlier revisions of the server
const LEGACY_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// SQLite-based storage for versioned memories
///
/// A single connection guarded by a mutex. Version allocation is one
/// `INSERT ... SELECT` statement and update runs in a transaction, so
/// concurrent callers never observe duplicate versions or a lineage with
/// no current record.
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open the store at `dsn`, creating the database and its parent directory if needed.
    ///
    /// An empty DSN or `:memory:` opens an in-memory database.
    pub fn open(dsn: &str) -> Result<Self> {
        if dsn.is_empty() || dsn == IN_MEMORY_DSN {
            return Self::in_memory();
        }

        if let Some(parent) = Path::new(dsn).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        debug!("Opening memory database at: {}", dsn);
        let conn = Connection::open(dsn)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self::with_connection(conn)?;
        info!("MemoryStore initialized at {}", dsn);
        Ok(store)
    }

    /// Create an in-memory MemoryStore (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
    }

    /// Append a new version without touching existing ones.
    ///
    /// Returns the allocated version (1 for a new lineage).
    pub fn save(&self, memory_id: &str, content: &str, tags: &[String]) -> Result<i64> {
        require_memory_id(memory_id)?;
        let tags_json = serde_json::to_string(tags)?;

        let conn = self.lock()?;
        let version = insert_next_version(&conn, memory_id, content, &tags_json)?;

        debug!("Saved memory {} version {}", memory_id, version);
        Ok(version)
    }

    /// Archive the current version(s) and append a new one, atomically.
    pub fn update(&self, memory_id: &str, content: &str, tags: &[String]) -> Result<i64> {
        require_memory_id(memory_id)?;
        let tags_json = serde_json::to_string(tags)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let archived = tx.execute(
            "UPDATE memories SET archived = 1 WHERE memory_id = ?1 AND archived = 0",
            params![memory_id],
        )?;
        let version = insert_next_version(&tx, memory_id, content, &tags_json)?;
        tx.commit()?;

        debug!(
            "Updated memory {} to version {} ({} previous version(s) archived)",
            memory_id, version, archived
        );
        Ok(version)
    }

    /// Archive every version of a lineage.
    ///
    /// Returns how many records were newly archived; calling it again
    /// returns 0. Unknown ids are not an error.
    pub fn archive(&self, memory_id: &str) -> Result<usize> {
        require_memory_id(memory_id)?;

        let conn = self.lock()?;
        let rows_affected = conn.execute(
            "UPDATE memories SET archived = 1 WHERE memory_id = ?1 AND archived = 0",
            params![memory_id],
        )?;

        debug!("Archived {} record(s) of memory {}", rows_affected, memory_id);
        Ok(rows_affected)
    }

    /// Every non-archived record, by `memory_id` then newest version first
    pub fn list_current(&self) -> Result<Vec<Memory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_MEMORY} WHERE archived = 0 ORDER BY memory_id, version DESC"
        ))?;
        let memories = stmt
            .query_map([], memory_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Listed {} current memories", memories.len());
        Ok(memories)
    }

    /// The highest non-archived version of a lineage
    pub fn get(&self, memory_id: &str) -> Result<Memory> {
        require_memory_id(memory_id)?;

        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "{SELECT_MEMORY} WHERE memory_id = ?1 AND archived = 0 ORDER BY version DESC LIMIT 1"
            ),
            params![memory_id],
            memory_from_row,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(memory_id.to_string()))
    }

    /// Non-archived records whose `memory_id` or `content` contains `query`.
    ///
    /// Case-sensitive; `%` and `_` match literally. An empty query matches everything.
    pub fn search(&self, query: &str) -> Result<Vec<Memory>> {
        if query.is_empty() {
            return self.list_current();
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_MEMORY}
             WHERE archived = 0 AND (instr(memory_id, ?1) > 0 OR instr(content, ?1) > 0)
             ORDER BY memory_id, version DESC"
        ))?;
        let memories = stmt
            .query_map(params![query], memory_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Found {} memories matching query: {}", memories.len(), query);
        Ok(memories)
    }

    /// Non-archived records carrying `tag` exactly
    pub fn list_by_tag(&self, tag: &str) -> Result<Vec<Memory>> {
        if tag.is_empty() {
            return Err(Error::Validation("Missing tag parameter".to_string()));
        }

        let mut memories = self.list_current()?;
        memories.retain(|m| m.has_tag(tag));

        debug!("Found {} memories tagged {}", memories.len(), tag);
        Ok(memories)
    }

    /// Full lineage including archived versions, oldest first
    pub fn history(&self, memory_id: &str) -> Result<Vec<Memory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_MEMORY} WHERE memory_id = ?1 ORDER BY version"
        ))?;
        let memories = stmt
            .query_map(params![memory_id], memory_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(memories)
    }
}

fn require_memory_id(memory_id: &str) -> Result<()> {
    if memory_id.is_empty() {
        return Err(Error::Validation("memory_id is required".to_string()));
    }
    Ok(())
}

/// Create the table and indexes, migrating tables from older revisions
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    if !has_column(conn, "memories", "tags")? {
        info!("Adding tags column to memories table");
        conn.execute(
            "ALTER TABLE memories ADD COLUMN tags TEXT NOT NULL DEFAULT '[]'",
            [],
        )?;
    }

    // Databases written by racy revisions can hold duplicate versions
    let unique = conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_memories_lineage_version
         ON memories(memory_id, version)",
        [],
    );
    match unique {
        Ok(_) => debug!("Unique (memory_id, version) index enabled"),
        Err(e) => warn!("Duplicate versions present, unique version index skipped: {}", e),
    }

    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Insert `MAX(version) + 1` for the lineage in a single statement
fn insert_next_version(
    conn: &Connection,
    memory_id: &str,
    content: &str,
    tags_json: &str,
) -> Result<i64> {
    let now = format_timestamp(Utc::now());
    let version = conn.query_row(
        "INSERT INTO memories (memory_id, version, content, tags, archived, created_at, updated_at)
         SELECT ?1, COALESCE(MAX(version), 0) + 1, ?2, ?3, 0, ?4, ?4
         FROM memories WHERE memory_id = ?1
         RETURNING version",
        params![memory_id, content, tags_json, now],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let tags = match row.get_ref(4)? {
        ValueRef::Null => Vec::new(),
        ValueRef::Text(raw) | ValueRef::Blob(raw) => decode_tags(raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                4,
                "tags".to_string(),
                other.data_type(),
            ));
        }
    };

    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Memory {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        version: row.get(2)?,
        content: row.get(3)?,
        tags,
        archived: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
        updated_at: parse_timestamp(7, &updated_at)?,
    })
}

/// JSON array of strings; `null` reads as no tags
fn decode_tags(raw: &[u8]) -> serde_json::Result<Vec<String>> {
    serde_json::from_slice::<Option<Vec<String>>>(raw).map(Option::unwrap_or_default)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in LEGACY_TIMESTAMP_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
