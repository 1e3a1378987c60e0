use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::FormError;

/// In-progress answers of a form. The core never interprets the keys or values.
pub type FormData = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormType {
    ExteriorDoors,
    GarageDoors,
    Windows,
    AsphaltShingles,
    Woodwork,
    Paint,
}

impl FormType {
    pub const ALL: [FormType; 6] = [
        FormType::ExteriorDoors,
        FormType::GarageDoors,
        FormType::Windows,
        FormType::AsphaltShingles,
        FormType::Woodwork,
        FormType::Paint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormType::ExteriorDoors => "EXTERIOR_DOORS",
            FormType::GarageDoors => "GARAGE_DOORS",
            FormType::Windows => "WINDOWS",
            FormType::AsphaltShingles => "ASPHALT_SHINGLES",
            FormType::Woodwork => "WOODWORK",
            FormType::Paint => "PAINT",
        }
    }

    /// Human label used in notification titles and messages.
    pub fn display_name(self) -> &'static str {
        match self {
            FormType::ExteriorDoors => "Exterior Doors",
            FormType::GarageDoors => "Garage Doors",
            FormType::Windows => "Windows",
            FormType::AsphaltShingles => "Asphalt Shingles",
            FormType::Woodwork => "Woodwork",
            FormType::Paint => "Paint",
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormType {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FormType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FormError::Validation(format!("Unknown form type '{s}'")))
    }
}

/// Lifecycle stage of a form. See `forms::transition` for the legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormStatus {
    Draft,
    Assigned,
    InProgress,
    Submitted,
    Reopened,
    Completed,
}

impl FormStatus {
    pub const ALL: [FormStatus; 6] = [
        FormStatus::Draft,
        FormStatus::Assigned,
        FormStatus::InProgress,
        FormStatus::Submitted,
        FormStatus::Reopened,
        FormStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormStatus::Draft => "DRAFT",
            FormStatus::Assigned => "ASSIGNED",
            FormStatus::InProgress => "IN_PROGRESS",
            FormStatus::Submitted => "SUBMITTED",
            FormStatus::Reopened => "REOPENED",
            FormStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormStatus {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FormStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FormError::Validation(format!("Unknown form status '{s}'")))
    }
}

/// One assignment of a form type to a customer within a project lot.
/// Mutated in place across its lifecycle; `version` bumps on every committed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    pub form_id: Uuid,
    pub form_type: FormType,
    pub status: FormStatus,
    pub project_id: String,
    pub lot_id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub assigned_by_user_id: String,
    pub assigned_by_name: Option<String>,
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub form_data: FormData,
    pub assigned_date: Option<DateTime<Utc>>,
    pub first_submitted_date: Option<DateTime<Utc>>,
    pub last_submitted_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub reopened_date: Option<DateTime<Utc>>,
    pub reopened_by_user_id: Option<String>,
    pub reopen_reason: Option<String>,
    pub reopen_count: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot written at the moment of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionHistoryEntry {
    pub id: Uuid,
    pub form_id: Uuid,
    pub submission_number: i32,
    pub status_at_submission: FormStatus,
    pub form_data_snapshot: FormData,
    pub submitted_by_user_id: String,
    pub submitted_by_name: String,
    pub submission_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FormRow {
    pub form_id: Uuid,
    pub form_type: String,
    pub status: String,
    pub project_id: String,
    pub lot_id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub assigned_by_user_id: String,
    pub assigned_by_name: Option<String>,
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub form_data: Value,
    pub assigned_date: Option<DateTime<Utc>>,
    pub first_submitted_date: Option<DateTime<Utc>>,
    pub last_submitted_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub reopened_date: Option<DateTime<Utc>>,
    pub reopened_by_user_id: Option<String>,
    pub reopen_reason: Option<String>,
    pub reopen_count: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubmissionRow {
    pub id: Uuid,
    pub form_id: Uuid,
    pub submission_number: i32,
    pub status_at_submission: String,
    pub form_data_snapshot: Value,
    pub submitted_by_user_id: String,
    pub submitted_by_name: String,
    pub submission_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Stored rows are trusted to hold known enum values; anything else is corruption.
fn stored<T: FromStr<Err = FormError>>(raw: &str, column: &str) -> Result<T, FormError> {
    raw.parse()
        .map_err(|_| FormError::Storage(format!("unrecognised {column} '{raw}' in store")))
}

fn stored_payload(value: Value, column: &str) -> Result<FormData, FormError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(FormData::new()),
        other => Err(FormError::Storage(format!(
            "{column} must be a JSON object, found {other}"
        ))),
    }
}

impl TryFrom<FormRow> for FormRecord {
    type Error = FormError;

    fn try_from(row: FormRow) -> Result<Self, Self::Error> {
        Ok(FormRecord {
            form_id: row.form_id,
            form_type: stored(&row.form_type, "form_type")?,
            status: stored(&row.status, "status")?,
            project_id: row.project_id,
            lot_id: row.lot_id,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            assigned_by_user_id: row.assigned_by_user_id,
            assigned_by_name: row.assigned_by_name,
            title: row.title,
            instructions: row.instructions,
            form_data: stored_payload(row.form_data, "form_data")?,
            assigned_date: row.assigned_date,
            first_submitted_date: row.first_submitted_date,
            last_submitted_date: row.last_submitted_date,
            completed_date: row.completed_date,
            reopened_date: row.reopened_date,
            reopened_by_user_id: row.reopened_by_user_id,
            reopen_reason: row.reopen_reason,
            reopen_count: row.reopen_count,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<SubmissionRow> for SubmissionHistoryEntry {
    type Error = FormError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(SubmissionHistoryEntry {
            id: row.id,
            form_id: row.form_id,
            submission_number: row.submission_number,
            status_at_submission: stored(&row.status_at_submission, "status_at_submission")?,
            form_data_snapshot: stored_payload(row.form_data_snapshot, "form_data_snapshot")?,
            submitted_by_user_id: row.submitted_by_user_id,
            submitted_by_name: row.submitted_by_name,
            submission_notes: row.submission_notes,
            submitted_at: row.submitted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_type_parses_case_insensitively() {
        assert_eq!("windows".parse::<FormType>().unwrap(), FormType::Windows);
        assert_eq!(
            " Asphalt_Shingles ".parse::<FormType>().unwrap(),
            FormType::AsphaltShingles
        );
    }

    #[test]
    fn test_unknown_form_type_is_validation_error() {
        let err = "SIDING".parse::<FormType>().unwrap_err();
        assert!(matches!(err, FormError::Validation(_)));
    }

    #[test]
    fn test_status_wire_names_match_serde() {
        for status in FormStatus::ALL {
            let serialized = serde_json::to_value(status).unwrap();
            assert_eq!(serialized, json!(status.as_str()));
        }
    }

    #[test]
    fn test_form_type_wire_names_match_serde() {
        for form_type in FormType::ALL {
            let serialized = serde_json::to_value(form_type).unwrap();
            assert_eq!(serialized, json!(form_type.as_str()));
        }
    }

    #[test]
    fn test_row_with_unknown_status_is_storage_error() {
        let now = Utc::now();
        let row = SubmissionRow {
            id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            submission_number: 1,
            status_at_submission: "ARCHIVED".into(),
            form_data_snapshot: json!({}),
            submitted_by_user_id: "u1".into(),
            submitted_by_name: "Una".into(),
            submission_notes: None,
            submitted_at: now,
        };
        let err = SubmissionHistoryEntry::try_from(row).unwrap_err();
        assert!(matches!(err, FormError::Storage(_)));
    }

    #[test]
    fn test_row_payload_must_be_object() {
        let err = stored_payload(json!([1, 2]), "form_data").unwrap_err();
        assert!(matches!(err, FormError::Storage(_)));
        assert!(stored_payload(Value::Null, "form_data").unwrap().is_empty());
    }
}
