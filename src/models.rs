// Data models for the three tables

use crate::error::ValidationError;
use crate::record::{IndexValue, Record};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

pub const SUBMISSIONS_TABLE: &str = "thesis_submissions";
pub const CATALOG_TABLE: &str = "thesis_data";
pub const USERS_TABLE: &str = "system_users";

/// Which side of the host institution a submitter is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitterCategory {
    Affiliated,
    External,
}

impl SubmitterCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitterCategory::Affiliated => "affiliated",
            SubmitterCategory::External => "external",
        }
    }
}

impl std::fmt::Display for SubmitterCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmitterCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "affiliated" => Ok(SubmitterCategory::Affiliated),
            "external" => Ok(SubmitterCategory::External),
            _ => Err(ValidationError::InvalidChoice {
                field: "category",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Campus {
    Main,
    North,
    South,
    East,
    West,
}

impl Campus {
    pub const ALL: [Campus; 5] = [Campus::Main, Campus::North, Campus::South, Campus::East, Campus::West];

    pub fn as_str(self) -> &'static str {
        match self {
            Campus::Main => "Main",
            Campus::North => "North",
            Campus::South => "South",
            Campus::East => "East",
            Campus::West => "West",
        }
    }
}

impl std::fmt::Display for Campus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Campus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Campus::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidChoice {
                field: "campus",
                value: s.to_string(),
            })
    }
}

/// Category-dependent columns of a submission
///
/// Affiliated submitters carry their institutional id and program;
/// external submitters carry only their institution's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum Affiliation {
    Affiliated { affiliated_id: String, program: String },
    External { institution: String },
}

impl Affiliation {
    pub fn category(&self) -> SubmitterCategory {
        match self {
            Affiliation::Affiliated { .. } => SubmitterCategory::Affiliated,
            Affiliation::External { .. } => SubmitterCategory::External,
        }
    }

    /// Affiliated id or institution name, whichever the category carries
    pub fn id_or_institution(&self) -> &str {
        match self {
            Affiliation::Affiliated { affiliated_id, .. } => affiliated_id,
            Affiliation::External { institution } => institution,
        }
    }

    pub fn program(&self) -> Option<&str> {
        match self {
            Affiliation::Affiliated { program, .. } => Some(program),
            Affiliation::External { .. } => None,
        }
    }
}

/// One row of `thesis_submissions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub full_name: String,
    #[serde(flatten)]
    pub affiliation: Affiliation,
    pub campus: Campus,
    pub thesis_title: String,
    /// Milliseconds since epoch, set once at insert
    pub submitted_at: i64,
}

impl SubmissionRecord {
    pub fn category(&self) -> SubmitterCategory {
        self.affiliation.category()
    }

    pub fn id_or_institution(&self) -> &str {
        self.affiliation.id_or_institution()
    }

    pub fn program(&self) -> Option<&str> {
        self.affiliation.program()
    }

    pub fn submitted_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.submitted_at)
    }

    /// Calendar date (UTC) of the submission
    pub fn submitted_on(&self) -> Option<NaiveDate> {
        self.submitted_at_utc().map(|dt| dt.date_naive())
    }
}

impl Record for SubmissionRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.submitted_at
    }

    fn collection_name() -> &'static str {
        SUBMISSIONS_TABLE
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("submitted_at".to_string(), IndexValue::Int(self.submitted_at));
        fields.insert("full_name".to_string(), IndexValue::from(self.full_name.as_str()));
        fields.insert("category".to_string(), IndexValue::from(self.category().as_str()));
        fields.insert("campus".to_string(), IndexValue::from(self.campus.as_str()));
        fields
    }
}

/// Raw input from the public submission form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionForm {
    pub full_name: String,
    pub category: Option<SubmitterCategory>,
    pub affiliated_id: Option<String>,
    pub institution: Option<String>,
    pub campus: Option<Campus>,
    pub program: Option<String>,
    pub thesis_title: String,
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

impl SubmissionForm {
    /// Check required fields and build the row to insert
    ///
    /// Fields that belong to the other category are dropped rather than
    /// rejected, matching a form that hides them on category switch.
    pub fn validate(&self, id: String, submitted_at: i64) -> Result<SubmissionRecord, ValidationError> {
        let full_name = required(Some(&self.full_name), "Full name")?;
        let category = self.category.ok_or(ValidationError::MissingField("Category"))?;

        let affiliation = match category {
            SubmitterCategory::Affiliated => Affiliation::Affiliated {
                affiliated_id: required(self.affiliated_id.as_deref(), "ID number")?,
                program: required(self.program.as_deref(), "Program")?,
            },
            SubmitterCategory::External => Affiliation::External {
                institution: required(self.institution.as_deref(), "Institution")?,
            },
        };

        let campus = self.campus.ok_or(ValidationError::MissingField("Campus"))?;
        let thesis_title = required(Some(&self.thesis_title), "Thesis title")?;

        Ok(SubmissionRecord {
            id,
            full_name,
            affiliation,
            campus,
            thesis_title,
            submitted_at,
        })
    }
}

/// One row of `thesis_data`, keyed by barcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThesisCatalogEntry {
    pub barcode: String,
    pub title: String,
    pub authors: Vec<String>,
    pub department: String,
    pub publication_year: i32,
    pub uploaded_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Record for ThesisCatalogEntry {
    fn id(&self) -> &str {
        &self.barcode
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        CATALOG_TABLE
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("deleted".to_string(), IndexValue::Bool(self.deleted));
        fields.insert("uploaded_at".to_string(), IndexValue::Int(self.uploaded_at));
        fields.insert("department".to_string(), IndexValue::from(self.department.as_str()));
        fields.insert("publication_year".to_string(), IndexValue::Int(self.publication_year as i64));
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Reader,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::Reader => write!(f, "Reader"),
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "reader" => Ok(Role::Reader),
            _ => Err(ValidationError::InvalidChoice {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl FromStr for AccountStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            _ => Err(ValidationError::InvalidChoice {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "Active"),
            AccountStatus::Inactive => write!(f, "Inactive"),
        }
    }
}

/// One row of `system_users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUserAccount {
    pub id: String,
    /// Reference to the identity held by the auth provider
    pub auth_id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub last_login_at: Option<i64>,
    pub created_at: i64,
}

impl Record for SystemUserAccount {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.last_login_at.unwrap_or(self.created_at).max(self.created_at)
    }

    fn collection_name() -> &'static str {
        USERS_TABLE
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("auth_id".to_string(), IndexValue::from(self.auth_id.as_str()));
        fields.insert("email".to_string(), IndexValue::from(self.email.as_str()));
        fields.insert("created_at".to_string(), IndexValue::Int(self.created_at));
        fields
    }
}

/// The signed-in identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub auth_id: String,
    /// Role as resolved when the session started
    pub role: Role,
}

/// Current timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fresh time-ordered row id
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affiliated_form() -> SubmissionForm {
        SubmissionForm {
            full_name: "  Alice Reyes ".to_string(),
            category: Some(SubmitterCategory::Affiliated),
            affiliated_id: Some("2020-0042".to_string()),
            institution: Some("ignored".to_string()),
            campus: Some(Campus::Main),
            program: Some("BS Computer Science".to_string()),
            thesis_title: "A Study".to_string(),
        }
    }

    #[test]
    fn test_now_ms() {
        let ts = now_ms();
        assert!(ts > 1_600_000_000_000);
    }

    #[test]
    fn test_validate_affiliated_drops_institution() {
        let record = affiliated_form().validate("s-1".to_string(), 1000).unwrap();

        assert_eq!(record.full_name, "Alice Reyes");
        assert_eq!(record.category(), SubmitterCategory::Affiliated);
        assert_eq!(record.id_or_institution(), "2020-0042");
        assert_eq!(record.program(), Some("BS Computer Science"));
    }

    #[test]
    fn test_validate_external_has_no_program() {
        let form = SubmissionForm {
            category: Some(SubmitterCategory::External),
            institution: Some("State College".to_string()),
            ..affiliated_form()
        };
        let record = form.validate("s-2".to_string(), 1000).unwrap();

        assert_eq!(record.id_or_institution(), "State College");
        assert_eq!(record.program(), None);
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let mut form = affiliated_form();
        form.program = Some("   ".to_string());
        assert_eq!(
            form.validate("s-3".to_string(), 0),
            Err(ValidationError::MissingField("Program"))
        );

        let form = SubmissionForm::default();
        assert_eq!(
            form.validate("s-4".to_string(), 0),
            Err(ValidationError::MissingField("Full name"))
        );

        let form = SubmissionForm {
            category: Some(SubmitterCategory::External),
            institution: None,
            ..affiliated_form()
        };
        assert_eq!(
            form.validate("s-5".to_string(), 0),
            Err(ValidationError::MissingField("Institution"))
        );
    }

    #[test]
    fn test_submission_serializes_flat_columns() {
        let record = affiliated_form().validate("s-1".to_string(), 1000).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["category"], "affiliated");
        assert_eq!(json["affiliated_id"], "2020-0042");
        assert_eq!(json["campus"], "Main");
        assert!(json.get("institution").is_none());

        let back: SubmissionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("EXTERNAL".parse::<SubmitterCategory>().unwrap(), SubmitterCategory::External);
        assert_eq!("north".parse::<Campus>().unwrap(), Campus::North);
        assert!("Moon".parse::<Campus>().is_err());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Inactive".parse::<AccountStatus>().unwrap(), AccountStatus::Inactive);
    }

    #[test]
    fn test_submitted_on_uses_utc_calendar_date() {
        let record = SubmissionRecord {
            id: "s-1".to_string(),
            full_name: "Ada".to_string(),
            affiliation: Affiliation::External {
                institution: "X".to_string(),
            },
            campus: Campus::Main,
            thesis_title: "T".to_string(),
            // 2024-02-01T23:30:00Z
            submitted_at: 1_706_830_200_000,
        };
        assert_eq!(record.submitted_on(), NaiveDate::from_ymd_opt(2024, 2, 1));
    }
}
