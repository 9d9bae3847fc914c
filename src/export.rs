// CSV rendering of a records view

use crate::models::SubmissionRecord;
use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_FILENAME: &str = "thesis_submissions.csv";

const HEADER: [&str; 7] = [
    "Name",
    "Category",
    "ID/Institution",
    "Campus",
    "Program",
    "Thesis Title",
    "Date",
];

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn row(fields: &[&str]) -> String {
    fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(",")
}

fn format_date(record: &SubmissionRecord) -> String {
    record
        .submitted_at_utc()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Render `view` as CSV: fixed header, one quoted row per record, `\n` between lines
pub fn export_csv(view: &[SubmissionRecord]) -> String {
    let mut lines = Vec::with_capacity(view.len() + 1);
    lines.push(row(&HEADER));

    for record in view {
        let date = format_date(record);
        lines.push(row(&[
            record.full_name.as_str(),
            record.category().as_str(),
            record.id_or_institution(),
            record.campus.as_str(),
            record.program().unwrap_or(""),
            record.thesis_title.as_str(),
            date.as_str(),
        ]));
    }

    lines.join("\n")
}

/// Write `view` to `thesis_submissions.csv` inside `dir`
pub fn write_export(dir: &Path, view: &[SubmissionRecord]) -> Result<PathBuf> {
    fs::create_dir_all(dir).context("Failed to create export directory")?;

    let path = dir.join(EXPORT_FILENAME);
    fs::write(&path, export_csv(view)).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = ?path, rows = view.len(), "Exported submissions");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Affiliation, Campus};
    use tempfile::TempDir;

    fn record(name: &str, affiliation: Affiliation, title: &str) -> SubmissionRecord {
        SubmissionRecord {
            id: "s-1".to_string(),
            full_name: name.to_string(),
            affiliation,
            campus: Campus::South,
            thesis_title: title.to_string(),
            submitted_at: 1_705_320_000_000, // 2024-01-15T12:00:00Z
        }
    }

    #[test]
    fn test_empty_view_is_header_only() {
        let csv = export_csv(&[]);
        assert_eq!(csv.lines().count(), 1);
        assert_eq!(
            csv,
            r#""Name","Category","ID/Institution","Campus","Program","Thesis Title","Date""#
        );
    }

    #[test]
    fn test_rows_are_fully_quoted() {
        let view = vec![
            record(
                "Alice",
                Affiliation::Affiliated {
                    affiliated_id: "2020-0042".to_string(),
                    program: "BS Biology".to_string(),
                },
                "A Study",
            ),
            record(
                "Bob",
                Affiliation::External {
                    institution: "Harbor Institute".to_string(),
                },
                "Tides, \"Waves\" and Wind",
            ),
        ];

        let csv = export_csv(&view);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            r#""Alice","affiliated","2020-0042","South","BS Biology","A Study","2024-01-15""#
        );
        assert_eq!(
            lines[2],
            r#""Bob","external","Harbor Institute","South","","Tides, ""Waves"" and Wind","2024-01-15""#
        );
    }

    #[test]
    fn test_write_export_uses_fixed_filename() {
        let temp = TempDir::new().unwrap();
        let path = write_export(&temp.path().join("out"), &[]).unwrap();

        assert_eq!(path.file_name().unwrap(), EXPORT_FILENAME);
        assert_eq!(fs::read_to_string(path).unwrap(), export_csv(&[]));
    }
}
