// JSONL log operations

use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

/// Append one line to a JSONL file under an exclusive lock
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open JSONL file for appending")?;

    file.lock_exclusive().context("Failed to acquire file lock")?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)?;
    file.sync_all()?;

    // Lock is released when file is dropped
    Ok(())
}

/// Read all lines from a JSONL file, returning the latest version per id
///
/// For duplicate ids the line with the highest `updated_at` wins; on a tie
/// the later line wins, so a tombstone written in the same millisecond as
/// its row still takes effect.
pub fn read_jsonl_latest<T>(path: &Path) -> Result<HashMap<String, T>>
where
    T: DeserializeOwned + HasId + HasUpdatedAt,
{
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path).context("Failed to open JSONL file")?;
    let reader = BufReader::new(file);
    let mut records: HashMap<String, T> = HashMap::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let record: T = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
                continue;
            }
        };

        let id = record.id();
        let updated_at = record.updated_at();

        match records.get(&id) {
            Some(existing) if updated_at < existing.updated_at() => {}
            _ => {
                records.insert(id, record);
            }
        }
    }

    info!(
        file = ?path,
        count = records.len(),
        "Loaded latest records from JSONL"
    );

    Ok(records)
}

/// Types that carry an id
pub trait HasId {
    fn id(&self) -> String;
}

/// Types that carry a version timestamp
pub trait HasUpdatedAt {
    fn updated_at(&self) -> i64;
}

/// One line of a table's JSONL log
///
/// Rows are wrapped so sync can recover the id and version of any table
/// without knowing its row type. Hard deletes append a line with
/// `tombstone` set and no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub id: String,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tombstone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogLine {
    pub fn row(id: &str, updated_at: i64, data: Value) -> Self {
        Self {
            id: id.to_string(),
            updated_at,
            tombstone: false,
            data: Some(data),
        }
    }

    pub fn tombstone(id: &str, updated_at: i64) -> Self {
        Self {
            id: id.to_string(),
            updated_at,
            tombstone: true,
            data: None,
        }
    }
}

impl HasId for LogLine {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl HasUpdatedAt for LogLine {
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}
