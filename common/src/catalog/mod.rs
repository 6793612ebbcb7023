use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Lifecycle state of a media record. Stored as lowercase text rather than
/// a SQLite integer enum so the database stays directly inspectable with a
/// plain `sqlite3` shell, matching the original's text-state columns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaState {
    Review,
    Library,
    Quarantined,
    Deleted,
}

impl MediaState {
    fn as_str(self) -> &'static str {
        match self {
            MediaState::Review => "review",
            MediaState::Library => "library",
            MediaState::Quarantined => "quarantine",
            MediaState::Deleted => "deleted",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "review" => Some(MediaState::Review),
            "library" => Some(MediaState::Library),
            "quarantine" => Some(MediaState::Quarantined),
            "deleted" => Some(MediaState::Deleted),
            _ => None,
        }
    }
}

/// Which lookup matched an existing record during dedup resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DupeBasis {
    File,
    Content,
}

impl DupeBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            DupeBasis::File => "file",
            DupeBasis::Content => "content",
        }
    }
}

/// A resolved media item as upserted into the catalog.
#[derive(Clone, Debug)]
pub struct MediaUpsert {
    pub hash_sha256: String,
    pub content_hash: Option<String>,
    pub canonical_path: String,
    pub taken_at: Option<NaiveDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub state: MediaState,
    /// Non-null only when `state` is `Quarantined`; cleared (set to `None`)
    /// for every other state so a record promoted out of quarantine never
    /// carries a stale reason.
    pub quarantine_reason: Option<String>,
}

/// An existing media row matched during dedup resolution.
#[derive(Clone, Debug)]
pub struct ExistingMedia {
    pub id: String,
    pub state: MediaState,
    pub canonical_path: Option<String>,
    pub basis: DupeBasis,
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS media (
    id              TEXT PRIMARY KEY,
    hash_sha256     TEXT NOT NULL UNIQUE,
    content_hash    TEXT,
    state           TEXT NOT NULL,
    canonical_path  TEXT,
    taken_at        TEXT,
    width           INTEGER,
    height          INTEGER,
    gps_lat         REAL,
    gps_lon         REAL,
    first_seen_at   TEXT NOT NULL,
    last_seen_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_media_content_hash ON media(content_hash);
CREATE INDEX IF NOT EXISTS idx_media_state ON media(state);

CREATE TABLE IF NOT EXISTS sightings (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    media_id         TEXT NOT NULL REFERENCES media(id),
    ingest_batch_id  TEXT NOT NULL,
    source_label     TEXT NOT NULL,
    original_path    TEXT NOT NULL,
    seen_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sightings_media ON sightings(media_id);
CREATE INDEX IF NOT EXISTS idx_sightings_batch ON sightings(ingest_batch_id);

CREATE TABLE IF NOT EXISTS ingest_batches (
    id           TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    note         TEXT,
    dry_run      INTEGER NOT NULL
);

CREATE VIEW IF NOT EXISTS v_review_queue AS
    SELECT * FROM media WHERE state = 'review';
"#;

/// Additive columns checked on every open, so a catalog created by an
/// older build of the engine still gets new columns without a destructive
/// migration. Mirrors the original's `ensure_column` helper.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("media", "gps_lat", "REAL"),
    ("media", "gps_lon", "REAL"),
    ("media", "quarantine_reason", "TEXT"),
];

/// Handle to the sqlite-backed catalog database.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("opening catalog at {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
        )
        .context("applying catalog pragmas")?;

        let mut catalog = Catalog { conn };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut catalog = Catalog { conn };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL).context("applying catalog schema")?;
        for (table, column, decl) in ADDITIVE_COLUMNS {
            self.ensure_column(table, column, decl)?;
        }
        Ok(())
    }

    fn ensure_column(&self, table: &str, column: &str, decl: &str) -> Result<()> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;

        if !existing.iter().any(|c| c == column) {
            debug!(table, column, "adding missing column");
            self.conn
                .execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
        }
        Ok(())
    }

    /// Look up an existing media row by exact file hash, then (if no exact
    /// match) by content hash. A content-hash match against a `library` row
    /// always wins over one against a `review` row, so a file that was
    /// already promoted never loses precedence to a fresher but less
    /// trusted review-queue duplicate.
    pub fn find_existing(&self, file_hash: &str, content_hash: Option<&str>) -> Result<Option<ExistingMedia>> {
        if let Some(found) = self.find_by_column("hash_sha256", file_hash, DupeBasis::File)? {
            return Ok(Some(found));
        }

        let Some(content_hash) = content_hash else {
            return Ok(None);
        };

        self.find_by_column_ordered(
            "content_hash",
            content_hash,
            "ORDER BY (state = 'library') DESC LIMIT 1",
            DupeBasis::Content,
        )
    }

    fn find_by_column(&self, column: &str, value: &str, basis: DupeBasis) -> Result<Option<ExistingMedia>> {
        self.find_by_column_ordered(column, value, "", basis)
    }

    fn find_by_column_ordered(
        &self,
        column: &str,
        value: &str,
        order_clause: &str,
        basis: DupeBasis,
    ) -> Result<Option<ExistingMedia>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, state, canonical_path FROM media WHERE {column} = ?1 {order_clause}"))?;
        let found = stmt
            .query_row(params![value], |row| {
                Ok(ExistingMedia {
                    id: row.get(0)?,
                    state: MediaState::from_str(&row.get::<_, String>(1)?).unwrap_or(MediaState::Review),
                    canonical_path: row.get(2)?,
                    basis,
                })
            })
            .optional()?;
        Ok(found)
    }

    /// Insert a new media row, or update the existing one sharing its
    /// `hash_sha256`. Fields supplied as `None` never clobber a previously
    /// recorded value: a second sighting with weaker metadata shouldn't
    /// erase a stronger reading from an earlier pass. The state transition
    /// itself is the one exception that always takes the newly proposed
    /// value -- callers decide state transitions deliberately, not this
    /// query.
    #[instrument(skip_all, fields(hash = %upsert.hash_sha256))]
    pub fn upsert_media(&self, upsert: &MediaUpsert) -> Result<String> {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, upsert.hash_sha256.as_bytes()).to_string();
        let now = Utc::now().naive_utc().to_string();
        let taken_at = upsert.taken_at.map(|t| t.to_string());

        self.conn
            .execute(
                "INSERT INTO media (
                    id, hash_sha256, content_hash, state, canonical_path,
                    taken_at, width, height, gps_lat, gps_lon, quarantine_reason,
                    first_seen_at, last_seen_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                ON CONFLICT(hash_sha256) DO UPDATE SET
                    content_hash      = COALESCE(excluded.content_hash, media.content_hash),
                    state             = excluded.state,
                    canonical_path    = COALESCE(excluded.canonical_path, media.canonical_path),
                    taken_at          = COALESCE(media.taken_at, excluded.taken_at),
                    width             = COALESCE(excluded.width, media.width),
                    height            = COALESCE(excluded.height, media.height),
                    gps_lat           = COALESCE(excluded.gps_lat, media.gps_lat),
                    gps_lon           = COALESCE(excluded.gps_lon, media.gps_lon),
                    quarantine_reason = excluded.quarantine_reason,
                    last_seen_at      = excluded.last_seen_at",
                params![
                    id,
                    upsert.hash_sha256,
                    upsert.content_hash,
                    upsert.state.as_str(),
                    upsert.canonical_path,
                    taken_at,
                    upsert.width,
                    upsert.height,
                    upsert.gps_lat,
                    upsert.gps_lon,
                    upsert.quarantine_reason,
                    now,
                ],
            )
            .context("upserting media row")?;

        // id above is only correct for the insert branch; on conflict the
        // existing row's id must win since uuid5 is derived from the hash,
        // which is the conflict key, the two are always identical.
        Ok(id)
    }

    pub fn insert_sighting(
        &self,
        media_id: &str,
        ingest_batch_id: &str,
        source_label: &str,
        original_path: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sightings (media_id, ingest_batch_id, source_label, original_path, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![media_id, ingest_batch_id, source_label, original_path, Utc::now().naive_utc().to_string()],
            )
            .context("inserting sighting row")?;
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn begin_ingest(&self, note: Option<&str>, dry_run: bool) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO ingest_batches (id, started_at, note, dry_run) VALUES (?1, ?2, ?3, ?4)",
                params![id, Utc::now().naive_utc().to_string(), note, dry_run],
            )
            .context("starting ingest batch")?;
        Ok(id)
    }

    pub fn finish_ingest(&self, batch_id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE ingest_batches SET finished_at = ?1 WHERE id = ?2",
                params![Utc::now().naive_utc().to_string(), batch_id],
            )
            .context("finishing ingest batch")?;
        Ok(())
    }

    pub fn is_ingest_finalized(&self, batch_id: &str) -> Result<bool> {
        let finished: Option<String> = self
            .conn
            .query_row(
                "SELECT finished_at FROM ingest_batches WHERE id = ?1",
                params![batch_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(finished.is_some())
    }
}
