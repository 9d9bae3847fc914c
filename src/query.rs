//! In-memory search, filtering and ordering of submission lists.
//!
//! [`filter_sort`] is a pure function of the record slice and a
//! [`Criteria`] value: it never mutates its input and returns a fresh
//! vector on every call.

use crate::filter::SortDirection;
use crate::models::{Campus, SubmissionRecord, SubmitterCategory, ThesisCatalogEntry};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which columns a search term is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    /// Name, title, id-or-institution and program
    #[default]
    All,
    Name,
    IdOrInstitution,
    Program,
    Title,
}

/// A categorical filter: everything, or exactly one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection<T> {
    All,
    Only(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: PartialEq> Selection<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    SubmittedAt,
    FullName,
    Campus,
    Title,
    Category,
}

/// Everything the admin has selected in the records browser
///
/// Date inputs are kept as entered (`YYYY-MM-DD`). An empty string is the
/// same as no input; anything unparseable makes the date predicate match
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Criteria {
    pub term: String,
    pub search_field: SearchField,
    pub category: Selection<SubmitterCategory>,
    pub campus: Selection<Campus>,
    /// Takes precedence over the range when set
    pub exact_date: Option<String>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    pub sort_key: SortKey,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePredicate {
    Any,
    Never,
    On(NaiveDate),
    /// Inclusive millisecond bounds
    Between { start: Option<i64>, end: Option<i64> },
}

impl DatePredicate {
    fn compile(criteria: &Criteria) -> Self {
        if let Some(raw) = non_empty(criteria.exact_date.as_deref()) {
            return match parse_date(raw) {
                Some(date) => DatePredicate::On(date),
                None => DatePredicate::Never,
            };
        }

        let start = non_empty(criteria.range_start.as_deref()).map(|raw| parse_date(raw).and_then(start_of_day_ms));
        let end = non_empty(criteria.range_end.as_deref()).map(|raw| parse_date(raw).and_then(end_of_day_ms));

        match (start, end) {
            (None, None) => DatePredicate::Any,
            (Some(None), _) | (_, Some(None)) => DatePredicate::Never,
            (start, end) => DatePredicate::Between {
                start: start.flatten(),
                end: end.flatten(),
            },
        }
    }

    fn matches(&self, record: &SubmissionRecord) -> bool {
        match *self {
            DatePredicate::Any => true,
            DatePredicate::Never => false,
            DatePredicate::On(date) => record.submitted_on() == Some(date),
            DatePredicate::Between { start, end } => {
                start.is_none_or(|s| record.submitted_at >= s) && end.is_none_or(|e| record.submitted_at <= e)
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn start_of_day_ms(date: NaiveDate) -> Option<i64> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

fn end_of_day_ms(date: NaiveDate) -> Option<i64> {
    let next = date.checked_add_days(Days::new(1))?;
    Some(start_of_day_ms(next)? - 1)
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn term_matches(record: &SubmissionRecord, field: SearchField, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    let name = || contains_folded(&record.full_name, needle);
    let title = || contains_folded(&record.thesis_title, needle);
    let id_or_institution = || contains_folded(record.id_or_institution(), needle);
    let program = || record.program().is_some_and(|p| contains_folded(p, needle));

    match field {
        SearchField::All => name() || title() || id_or_institution() || program(),
        SearchField::Name => name(),
        SearchField::IdOrInstitution => id_or_institution(),
        SearchField::Program => program(),
        SearchField::Title => title(),
    }
}

/// Locale-style string ordering: case-folded first, exact text as tie-break
pub fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

fn compare(a: &SubmissionRecord, b: &SubmissionRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::SubmittedAt => a.submitted_at.cmp(&b.submitted_at),
        SortKey::FullName => collate(&a.full_name, &b.full_name),
        SortKey::Campus => collate(a.campus.as_str(), b.campus.as_str()),
        SortKey::Title => collate(&a.thesis_title, &b.thesis_title),
        SortKey::Category => collate(a.category().as_str(), b.category().as_str()),
    }
}

/// Filter and order `records` by `criteria`
///
/// Every active predicate must hold. The sort is stable in both
/// directions, so equal keys keep their input order.
pub fn filter_sort(records: &[SubmissionRecord], criteria: &Criteria) -> Vec<SubmissionRecord> {
    let needle = criteria.term.trim().to_lowercase();
    let dates = DatePredicate::compile(criteria);

    let mut view: Vec<SubmissionRecord> = records
        .iter()
        .filter(|r| term_matches(r, criteria.search_field, &needle))
        .filter(|r| criteria.category.admits(&r.category()))
        .filter(|r| criteria.campus.admits(&r.campus))
        .filter(|r| dates.matches(r))
        .cloned()
        .collect();

    view.sort_by(|a, b| {
        let ord = compare(a, b, criteria.sort_key);
        match criteria.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });

    view
}

/// Case-insensitive catalog search over title, barcode, department and authors
pub fn search_catalog(entries: &[ThesisCatalogEntry], term: &str) -> Vec<ThesisCatalogEntry> {
    let needle = term.trim().to_lowercase();
    entries
        .iter()
        .filter(|e| {
            needle.is_empty()
                || contains_folded(&e.title, &needle)
                || contains_folded(&e.barcode, &needle)
                || contains_folded(&e.department, &needle)
                || e.authors.iter().any(|a| contains_folded(a, &needle))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Affiliation;

    const JAN_15_2024: i64 = 1_705_320_000_000; // 2024-01-15T12:00:00Z
    const FEB_01_2024: i64 = 1_706_745_600_000; // 2024-02-01T00:00:00Z

    fn affiliated(id: &str, name: &str, campus: Campus, title: &str, at: i64) -> SubmissionRecord {
        SubmissionRecord {
            id: id.to_string(),
            full_name: name.to_string(),
            affiliation: Affiliation::Affiliated {
                affiliated_id: format!("ID-{}", id),
                program: "BS Biology".to_string(),
            },
            campus,
            thesis_title: title.to_string(),
            submitted_at: at,
        }
    }

    fn external(id: &str, name: &str, campus: Campus, title: &str, at: i64) -> SubmissionRecord {
        SubmissionRecord {
            id: id.to_string(),
            full_name: name.to_string(),
            affiliation: Affiliation::External {
                institution: "Harbor Institute".to_string(),
            },
            campus,
            thesis_title: title.to_string(),
            submitted_at: at,
        }
    }

    fn sample() -> Vec<SubmissionRecord> {
        vec![
            affiliated("1", "Alice", Campus::Main, "A Study", JAN_15_2024),
            external("2", "Bob", Campus::Main, "Other Study", FEB_01_2024),
            affiliated("3", "carol", Campus::North, "Soil and Water", FEB_01_2024 + 3_600_000),
        ]
    }

    fn ids(view: &[SubmissionRecord]) -> Vec<&str> {
        view.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_term_all_fields_scenario() {
        let records = sample();
        let criteria = Criteria {
            term: "alice".to_string(),
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &criteria)), vec!["1"]);
    }

    #[test]
    fn test_term_scoped_to_field() {
        let records = sample();

        let by_institution = Criteria {
            term: "HARBOR".to_string(),
            search_field: SearchField::IdOrInstitution,
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &by_institution)), vec!["2"]);

        let by_program = Criteria {
            term: "biology".to_string(),
            search_field: SearchField::Program,
            sort_key: SortKey::FullName,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &by_program)), vec!["1", "3"]);

        let title_only = Criteria {
            term: "alice".to_string(),
            search_field: SearchField::Title,
            ..Default::default()
        };
        assert!(filter_sort(&records, &title_only).is_empty());
    }

    #[test]
    fn test_output_is_reordered_subsequence() {
        let records = sample();
        let criteria = Criteria {
            term: "study".to_string(),
            sort_key: SortKey::FullName,
            direction: SortDirection::Desc,
            ..Default::default()
        };
        let view = filter_sort(&records, &criteria);

        assert_eq!(ids(&view), vec!["2", "1"]);
        for row in &view {
            assert_eq!(records.iter().filter(|r| *r == row).count(), 1);
        }
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let records = sample();
        let criteria = Criteria {
            campus: Selection::Only(Campus::Main),
            sort_key: SortKey::Category,
            ..Default::default()
        };
        assert_eq!(filter_sort(&records, &criteria), filter_sort(&records, &criteria));
    }

    #[test]
    fn test_category_all_is_neutral() {
        let records = sample();
        let campus_only = Criteria {
            campus: Selection::Only(Campus::Main),
            ..Default::default()
        };
        let with_all = Criteria {
            category: Selection::All,
            ..campus_only.clone()
        };
        assert_eq!(filter_sort(&records, &campus_only), filter_sort(&records, &with_all));

        let external_only = Criteria {
            category: Selection::Only(SubmitterCategory::External),
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &external_only)), vec!["2"]);
    }

    #[test]
    fn test_range_excludes_day_after_end() {
        let records = sample();
        let criteria = Criteria {
            range_start: Some("2024-01-01".to_string()),
            range_end: Some("2024-01-31".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &criteria)), vec!["1"]);
    }

    #[test]
    fn test_range_end_covers_whole_day_and_open_bounds() {
        let records = sample();
        let through_feb_first = Criteria {
            range_end: Some("2024-02-01".to_string()),
            sort_key: SortKey::SubmittedAt,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &through_feb_first)), vec!["1", "2", "3"]);

        let from_feb = Criteria {
            range_start: Some("2024-02-01".to_string()),
            range_end: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &from_feb)), vec!["3", "2"]);
    }

    #[test]
    fn test_exact_date_wins_over_range() {
        let records = sample();
        let criteria = Criteria {
            exact_date: Some("2024-01-15".to_string()),
            range_start: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &criteria)), vec!["1"]);
    }

    #[test]
    fn test_malformed_dates_fail_closed() {
        let records = sample();
        let bad_exact = Criteria {
            exact_date: Some("15/01/2024".to_string()),
            ..Default::default()
        };
        assert!(filter_sort(&records, &bad_exact).is_empty());

        let bad_end = Criteria {
            range_start: Some("2024-01-01".to_string()),
            range_end: Some("2024-13-40".to_string()),
            ..Default::default()
        };
        assert!(filter_sort(&records, &bad_end).is_empty());
    }

    #[test]
    fn test_sort_by_name_ascending() {
        let records = vec![
            external("z", "Zed", Campus::Main, "T", 1),
            external("a", "Amy", Campus::Main, "T", 2),
        ];
        let criteria = Criteria {
            sort_key: SortKey::FullName,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        let names: Vec<String> = filter_sort(&records, &criteria)
            .into_iter()
            .map(|r| r.full_name)
            .collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
    }

    #[test]
    fn test_collation_ignores_case() {
        let records = sample();
        let criteria = Criteria {
            sort_key: SortKey::FullName,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        // "carol" sorts after "Bob" despite the lowercase initial
        assert_eq!(ids(&filter_sort(&records, &criteria)), vec!["1", "2", "3"]);
        assert_eq!(collate("a", "A"), Ordering::Greater);
        assert_eq!(collate("apple", "Banana"), Ordering::Less);
    }

    #[test]
    fn test_equal_keys_keep_input_order() {
        let records = sample();
        let criteria = Criteria {
            sort_key: SortKey::Campus,
            direction: SortDirection::Desc,
            ..Default::default()
        };
        assert_eq!(ids(&filter_sort(&records, &criteria)), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(filter_sort(&[], &Criteria::default()).is_empty());
    }

    #[test]
    fn test_search_catalog_matches_authors() {
        let entries = vec![ThesisCatalogEntry {
            barcode: "T-001".to_string(),
            title: "Tidal Energy".to_string(),
            authors: vec!["M. Santos".to_string()],
            department: "Engineering".to_string(),
            publication_year: 2019,
            uploaded_at: 1,
            updated_at: 1,
            deleted: false,
        }];
        assert_eq!(search_catalog(&entries, "santos").len(), 1);
        assert_eq!(search_catalog(&entries, "t-00").len(), 1);
        assert_eq!(search_catalog(&entries, "").len(), 1);
        assert!(search_catalog(&entries, "chemistry").is_empty());
    }
}
