use std::path::Path;

use anyhow::{anyhow, Context, Result};
use outreach_core::{
    FieldMap, GenerationCredential, Record, RecordStore, SourceProfile, WorkspaceState,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 2;

const SOURCE_PROFILE_KEY: &str = "source_profile";
const GENERATION_CREDENTIAL_KEY: &str = "generation_credential";

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY CHECK (key IN ('source_profile','generation_credential')),
  value_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS record_imports (
  import_id TEXT PRIMARY KEY,
  imported_at TEXT NOT NULL,
  record_count INTEGER NOT NULL CHECK (record_count >= 0),
  page_count INTEGER NOT NULL CHECK (page_count >= 0)
);

CREATE TABLE IF NOT EXISTS records (
  position INTEGER PRIMARY KEY CHECK (position >= 0),
  record_id TEXT NOT NULL,
  fields_json TEXT NOT NULL,
  import_id TEXT NOT NULL,
  FOREIGN KEY (import_id) REFERENCES record_imports(import_id)
);

CREATE INDEX IF NOT EXISTS idx_records_record_id ON records(record_id);
CREATE INDEX IF NOT EXISTS idx_record_imports_imported_at ON record_imports(imported_at);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS workspace_state (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  state_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// SQLite cache for imported records, saved settings, and the workspace.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordImport {
    pub import_id: String,
    pub imported_at: String,
    pub record_count: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedRecords {
    pub store: RecordStore,
    pub last_import: Option<RecordImport>,
}

impl SqliteStore {
    /// Open a SQLite-backed outreach store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when any migration step fails or the database is newer than supported.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.apply_migration(1, MIGRATION_001_SQL)?;
            version = 1;
        }

        if version < 2 {
            self.apply_migration(2, MIGRATION_002_SQL)?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!("unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"));
        }

        Ok(())
    }

    fn apply_migration(&mut self, version: i64, sql: &str) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql).with_context(|| format!("failed to apply migration {version}"))?;
        record_schema_version(&tx, version)?;
        tx.commit().with_context(|| format!("failed to commit migration {version}"))?;
        Ok(())
    }

    /// Replace the cached record set with `records` in one transaction.
    ///
    /// A failure anywhere leaves the previous record set untouched.
    ///
    /// # Errors
    /// Returns an error when serialization or any write fails.
    pub fn replace_records(&mut self, records: &[Record], page_count: usize) -> Result<RecordImport> {
        let import = RecordImport {
            import_id: Ulid::new().to_string(),
            imported_at: now_rfc3339()?,
            record_count: records.len(),
            page_count,
        };

        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute("DELETE FROM records", []).context("failed to clear cached records")?;
        tx.execute(
            "INSERT INTO record_imports(import_id, imported_at, record_count, page_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                import.import_id,
                import.imported_at,
                i64::try_from(import.record_count).context("record count overflow")?,
                i64::try_from(import.page_count).context("page count overflow")?,
            ],
        )
        .context("failed to insert record import")?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO records(position, record_id, fields_json, import_id)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .context("failed to prepare record insert")?;
            for (position, record) in records.iter().enumerate() {
                let fields_json = serde_json::to_string(&record.fields)
                    .with_context(|| format!("failed to serialize fields for record {}", record.id))?;
                stmt.execute(params![
                    i64::try_from(position).context("record position overflow")?,
                    record.id,
                    fields_json,
                    import.import_id,
                ])
                .with_context(|| format!("failed to insert record {}", record.id))?;
            }
        }

        tx.commit().context("failed to commit record replacement")?;
        Ok(import)
    }

    /// Load the cached record set in source order with its import metadata.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn load_records(&self) -> Result<CachedRecords> {
        let mut stmt = self
            .conn
            .prepare("SELECT record_id, fields_json FROM records ORDER BY position ASC")
            .context("failed to prepare record query")?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            let record_id: String = row.get(0)?;
            let fields_json: String = row.get(1)?;
            let fields = serde_json::from_str::<FieldMap>(&fields_json)
                .with_context(|| format!("failed to decode fields for record {record_id}"))?;
            records.push(Record::new(record_id, fields));
        }

        Ok(CachedRecords { store: RecordStore::from_records(records), last_import: self.latest_import()? })
    }

    /// # Errors
    /// Returns an error when the import log cannot be read.
    pub fn latest_import(&self) -> Result<Option<RecordImport>> {
        self.conn
            .query_row(
                "SELECT import_id, imported_at, record_count, page_count
                 FROM record_imports
                 ORDER BY rowid DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
            .context("failed to read latest record import")?
            .map(|(import_id, imported_at, record_count, page_count)| {
                parse_rfc3339(&imported_at)?;
                Ok(RecordImport {
                    import_id,
                    imported_at,
                    record_count: usize::try_from(record_count).context("negative record count")?,
                    page_count: usize::try_from(page_count).context("negative page count")?,
                })
            })
            .transpose()
    }

    /// # Errors
    /// Returns an error when the workspace cannot be serialized or written.
    pub fn save_workspace(&mut self, workspace: &WorkspaceState) -> Result<()> {
        let state_json = serde_json::to_string(workspace).context("failed to serialize workspace state")?;
        self.conn
            .execute(
                "INSERT INTO workspace_state(id, state_json, updated_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
                params![state_json, now_rfc3339()?],
            )
            .context("failed to save workspace state")?;
        Ok(())
    }

    /// Load the persisted workspace, or a fresh one when nothing was saved.
    ///
    /// # Errors
    /// Returns an error when the row cannot be read or decoded.
    pub fn load_workspace(&self) -> Result<WorkspaceState> {
        let state_json = self
            .conn
            .query_row("SELECT state_json FROM workspace_state WHERE id = 1", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .context("failed to read workspace state")?;

        match state_json {
            Some(json) => serde_json::from_str(&json).context("failed to decode workspace state"),
            None => Ok(WorkspaceState::default()),
        }
    }

    /// # Errors
    /// Returns an error when the profile cannot be written.
    pub fn save_source_profile(&mut self, profile: &SourceProfile) -> Result<()> {
        self.put_setting(SOURCE_PROFILE_KEY, profile)
    }

    /// # Errors
    /// Returns an error when the stored profile cannot be read or decoded.
    pub fn load_source_profile(&self) -> Result<Option<SourceProfile>> {
        self.get_setting(SOURCE_PROFILE_KEY)
    }

    /// # Errors
    /// Returns an error when the credential cannot be written.
    pub fn save_generation_credential(&mut self, credential: &GenerationCredential) -> Result<()> {
        self.put_setting(GENERATION_CREDENTIAL_KEY, credential)
    }

    /// # Errors
    /// Returns an error when the stored credential cannot be read or decoded.
    pub fn load_generation_credential(&self) -> Result<Option<GenerationCredential>> {
        self.get_setting(GENERATION_CREDENTIAL_KEY)
    }

    fn put_setting<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value_json =
            serde_json::to_string(value).with_context(|| format!("failed to serialize setting {key}"))?;
        self.conn
            .execute(
                "INSERT INTO settings(key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
                params![key, value_json, now_rfc3339()?],
            )
            .with_context(|| format!("failed to save setting {key}"))?;
        Ok(())
    }

    fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value_json = self
            .conn
            .query_row("SELECT value_json FROM settings WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("failed to read setting {key}"))?;

        value_json
            .map(|json| serde_json::from_str(&json).with_context(|| format!("failed to decode setting {key}")))
            .transpose()
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
