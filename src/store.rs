// Table store: JSONL log as source of truth, SQLite as query cache

use crate::filter::{Filter, FilterOp, OrderBy};
use crate::jsonl::{self, LogLine};
use crate::models::now_ms;
use crate::record::{IndexValue, Record};
use eyre::{Context, Result, eyre};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CURRENT_VERSION: u32 = 1;
const STORE_DIR: &str = ".thesisdesk";
const DB_FILE: &str = "thesisdesk.db";

/// Persistent table store
pub struct Store {
    base_path: PathBuf,
    db: Connection,
    reindex_pending: bool,
    /// JSONL length per collection as of our last look
    log_marks: HashMap<String, u64>,
    /// Collections another writer appended to since the last poll
    external_writes: BTreeSet<String>,
}

impl Store {
    /// Open or create a store at the given path
    ///
    /// The store lives in a `.thesisdesk` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(STORE_DIR);

        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let mut store = Self {
            base_path,
            db,
            reindex_pending: false,
            log_marks: HashMap::new(),
            external_writes: BTreeSet::new(),
        };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        if store.is_stale()? {
            info!("Database is stale, syncing from JSONL files");
            store.sync()?;
        }
        store.log_marks = store.log_lengths()?;

        Ok(store)
    }

    pub fn db(&self) -> &Connection {
        &self.db
    }

    /// True once after a sync; callers rebuild indexes for their row types
    pub fn take_reindex_pending(&mut self) -> bool {
        std::mem::take(&mut self.reindex_pending)
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(collection, updated_at);

            CREATE TABLE IF NOT EXISTS record_indexes (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                field_value_str TEXT,
                field_value_int INTEGER,
                field_value_bool INTEGER,
                PRIMARY KEY (collection, id, field_name)
            );

            CREATE INDEX IF NOT EXISTS idx_record_indexes_field_str ON record_indexes(collection, field_name, field_value_str);
            CREATE INDEX IF NOT EXISTS idx_record_indexes_field_int ON record_indexes(collection, field_name, field_value_int);
            CREATE INDEX IF NOT EXISTS idx_record_indexes_field_bool ON record_indexes(collection, field_name, field_value_bool);

            CREATE TABLE IF NOT EXISTS sync_metadata (
                collection TEXT PRIMARY KEY,
                last_sync_time INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "thesisdesk.db\nthesisdesk.db-shm\nthesisdesk.db-wal\n")?;
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Check if the database needs syncing from JSONL
    ///
    /// Returns true if any JSONL file has been modified since the last sync,
    /// or if there are JSONL files that have never been synced.
    pub fn is_stale(&self) -> Result<bool> {
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }

            let collection = match path.file_stem().and_then(|s| s.to_str()) {
                Some(c) => c,
                None => continue,
            };

            let file_mtime = Self::file_mtime(&path)?;

            let stored_mtime: Option<i64> = self
                .db
                .query_row(
                    "SELECT file_mtime FROM sync_metadata WHERE collection = ?1",
                    [collection],
                    |row| row.get(0),
                )
                .optional()?;

            match stored_mtime {
                None => return Ok(true),
                Some(mtime) if file_mtime > mtime => return Ok(true),
                _ => continue,
            }
        }

        Ok(false)
    }

    fn file_mtime(path: &Path) -> Result<i64> {
        Ok(fs::metadata(path)?
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0))
    }

    // ========================================================================
    // Row API
    // ========================================================================

    /// Insert or replace a row
    pub fn create<T: Record>(&mut self, record: T) -> Result<String> {
        let collection = T::collection_name();
        Self::validate_collection_name(collection)?;

        let id = record.id().to_string();
        Self::validate_id(&id)?;

        let data = serde_json::to_value(&record).context("Failed to serialize record")?;

        // 1. Append to JSONL
        self.append_line(collection, &LogLine::row(&id, record.updated_at(), data.clone()))?;

        // 2. Mirror into SQLite
        let tx = self.db.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO records (collection, id, data_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![collection, &id, data.to_string(), record.updated_at()],
        )?;

        Self::update_indexes_tx(&tx, collection, &id, &record.indexed_fields())?;

        tx.commit()?;

        debug!(collection, id = %id, "Stored record");
        Ok(id)
    }

    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let collection = T::collection_name();

        let result = self
            .db
            .query_row(
                "SELECT data_json FROM records WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match result {
            Some(json) => {
                let record: T = serde_json::from_str(&json).context("Failed to deserialize record from database")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn update<T: Record>(&mut self, record: T) -> Result<()> {
        self.create(record)?;
        Ok(())
    }

    /// Hard delete a row. Returns false if no such row existed.
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<bool> {
        let collection = T::collection_name();

        let exists: bool = self.db.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE collection = ?1 AND id = ?2)",
            rusqlite::params![collection, id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(false);
        }

        // 1. Append tombstone to JSONL
        self.append_line(collection, &LogLine::tombstone(id, now_ms()))?;

        // 2. Delete from SQLite
        let tx = self.db.transaction()?;
        tx.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;
        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;
        tx.commit()?;

        debug!(collection, id, "Deleted record");
        Ok(true)
    }

    /// List rows newest-version first
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        self.list_ordered(filters, &OrderBy::default())
    }

    /// List rows matching every filter, ordered by an indexed field
    pub fn list_ordered<T: Record>(&self, filters: &[Filter], order: &OrderBy) -> Result<Vec<T>> {
        let collection = T::collection_name();

        let mut query = String::from(
            "SELECT r.data_json
             FROM records r
             WHERE r.collection = ?1",
        );

        for (i, filter) in filters.iter().enumerate() {
            Self::validate_field_name(&filter.field)?;

            let alias = format!("idx{}", i);
            let column = match &filter.value {
                IndexValue::String(_) => "field_value_str",
                IndexValue::Int(_) => "field_value_int",
                IndexValue::Bool(_) => "field_value_bool",
            };

            query.push_str(&format!(
                " AND EXISTS (
                    SELECT 1 FROM record_indexes {alias}
                    WHERE {alias}.collection = r.collection
                      AND {alias}.id = r.id
                      AND {alias}.field_name = ?{name_pos}
                      AND {alias}.{column} {op} ?{value_pos})",
                name_pos = i + 2,
                op = filter.op.to_sql(),
                value_pos = i + 2 + filters.len(),
            ));
        }

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        params.push(Box::new(collection.to_string()));

        for filter in filters {
            params.push(Box::new(filter.field.clone()));
        }

        for filter in filters {
            match (&filter.value, filter.op) {
                (IndexValue::String(s), FilterOp::Contains) => params.push(Box::new(format!("%{}%", s))),
                (IndexValue::String(s), _) => params.push(Box::new(s.clone())),
                (IndexValue::Int(i), _) => params.push(Box::new(*i)),
                (IndexValue::Bool(b), _) => params.push(Box::new(*b as i64)),
            }
        }

        let direction = order.direction.to_sql();
        if order.field == "updated_at" {
            query.push_str(&format!(" ORDER BY r.updated_at {direction}, r.id {direction}"));
        } else {
            Self::validate_field_name(&order.field)?;
            query.push_str(&format!(
                " ORDER BY (
                    SELECT COALESCE(o.field_value_int, o.field_value_bool, o.field_value_str)
                    FROM record_indexes o
                    WHERE o.collection = r.collection AND o.id = r.id AND o.field_name = ?{}
                 ) {direction}, r.id {direction}",
                params.len() + 1
            ));
            params.push(Box::new(order.field.clone()));
        }

        let mut stmt = self.db.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row_result in rows {
            let data_json = row_result?;
            let record: T = serde_json::from_str(&data_json).context("Failed to deserialize record")?;
            results.push(record);
        }

        debug!(collection, count = results.len(), "Listed records");
        Ok(results)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn append_line(&mut self, collection: &str, line: &LogLine) -> Result<()> {
        let jsonl_path = self.base_path.join(format!("{}.jsonl", collection));

        let seen = self.log_marks.get(collection).copied().unwrap_or(0);
        if Self::file_len(&jsonl_path)? != seen {
            self.external_writes.insert(collection.to_string());
        }

        jsonl::append_jsonl(&jsonl_path, line)?;
        self.log_marks.insert(collection.to_string(), Self::file_len(&jsonl_path)?);
        Ok(())
    }

    fn file_len(path: &Path) -> Result<u64> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    fn log_lengths(&self) -> Result<HashMap<String, u64>> {
        let mut lengths = HashMap::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(collection) = path.file_stem().and_then(|s| s.to_str()) {
                lengths.insert(collection.to_string(), Self::file_len(&path)?);
            }
        }
        Ok(lengths)
    }

    /// Collections whose JSONL log grew through another writer since the last call
    ///
    /// Appends made through this store are not reported. Every writer shares
    /// the SQLite cache, so the reported rows are already readable.
    pub fn poll_external_changes(&mut self) -> Result<Vec<String>> {
        let current = self.log_lengths()?;
        for (collection, len) in &current {
            if self.log_marks.get(collection) != Some(len) {
                self.external_writes.insert(collection.clone());
            }
        }
        self.log_marks = current;

        let changed: Vec<String> = std::mem::take(&mut self.external_writes).into_iter().collect();
        if !changed.is_empty() {
            debug!(collections = ?changed, "Detected writes from another store handle");
        }
        Ok(changed)
    }

    fn update_indexes_tx(
        tx: &rusqlite::Transaction,
        collection: &str,
        id: &str,
        fields: &HashMap<String, IndexValue>,
    ) -> Result<()> {
        tx.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;

        for (field_name, value) in fields {
            Self::validate_field_name(field_name)?;

            let (s, i, b): (Option<&str>, Option<i64>, Option<i64>) = match value {
                IndexValue::String(s) => (Some(s), None, None),
                IndexValue::Int(i) => (None, Some(*i), None),
                IndexValue::Bool(b) => (None, None, Some(*b as i64)),
            };

            tx.execute(
                "INSERT INTO record_indexes (collection, id, field_name, field_value_str, field_value_int, field_value_bool)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![collection, id, field_name, s, i, b],
            )?;
        }

        Ok(())
    }

    fn validate_collection_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Collection name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Collection name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(eyre!(
                "Invalid collection name: {} (must be alphanumeric with _/-)",
                name
            ));
        }
        Ok(())
    }

    fn validate_field_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Field name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Field name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(eyre!("Invalid field name: {} (must be alphanumeric with _)", name));
        }
        Ok(())
    }

    fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(eyre!("Record ID cannot be empty or whitespace-only"));
        }
        if id.len() > 256 {
            return Err(eyre!("Record ID too long: {} chars (max 256)", id.len()));
        }
        Ok(())
    }

    // ========================================================================
    // Sync operations
    // ========================================================================

    /// Rebuild the SQLite cache from the JSONL logs
    ///
    /// Indexes are cleared; call `rebuild_indexes::<T>()` for each row type
    /// afterwards (see `take_reindex_pending`).
    pub fn sync(&mut self) -> Result<()> {
        info!("Syncing database from JSONL files");

        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM record_indexes", [])?;
        tx.execute("DELETE FROM records", [])?;

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }

            let collection = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| eyre!("Invalid JSONL filename: {:?}", path))?
                .to_string();

            debug!(collection = %collection, "Syncing collection");

            let file_mtime = Self::file_mtime(&path)?;
            let lines: HashMap<String, LogLine> = jsonl::read_jsonl_latest(&path)?;

            for (id, line) in lines {
                let Some(data) = line.data.filter(|_| !line.tombstone) else {
                    continue;
                };

                tx.execute(
                    "INSERT OR REPLACE INTO records (collection, id, data_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![&collection, &id, data.to_string(), line.updated_at],
                )?;
            }

            tx.execute(
                "INSERT OR REPLACE INTO sync_metadata (collection, last_sync_time, file_mtime)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![&collection, now_ms(), file_mtime],
            )?;
        }

        tx.commit()?;
        self.reindex_pending = true;

        info!("Sync complete");
        Ok(())
    }

    /// Rebuild indexes for one row type after sync
    ///
    /// Rows that don't deserialize to `T` are skipped with a warning.
    /// Returns the number of rows indexed.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let collection = T::collection_name();

        let records_data: Vec<(String, String)> = {
            let mut stmt = self
                .db
                .prepare("SELECT id, data_json FROM records WHERE collection = ?1")?;

            let rows = stmt.query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            rows.filter_map(|r| r.ok()).collect()
        };

        let tx = self.db.transaction()?;
        let mut count = 0;

        for (id, data_json) in records_data {
            let record: T = match serde_json::from_str(&data_json) {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        collection = collection,
                        id = &id,
                        error = ?e,
                        "Skipping record that doesn't match type"
                    );
                    continue;
                }
            };

            Self::update_indexes_tx(&tx, collection, &id, &record.indexed_fields())?;
            count += 1;
        }

        tx.commit()?;
        debug!(collection = collection, count = count, "Rebuilt indexes for collection");
        Ok(count)
    }
}
