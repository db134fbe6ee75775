use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Opaque identity the store assigns to an attendance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Evidence that a student was present in a group on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 7)]
    pub group_id: u64,

    #[schema(example = 12)]
    pub student_id: u64,

    #[schema(example = "2024-05-06", value_type = String, format = "date")]
    pub date: NaiveDate,
}

impl AttendanceRecord {
    pub fn cell(&self) -> CellKey {
        CellKey {
            student_id: self.student_id,
            date: self.date,
        }
    }
}

/// One cell of the attendance sheet: a student on a session date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub student_id: u64,
    pub date: NaiveDate,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub group_id: u64,
    pub student_id: u64,
    pub date: NaiveDate,
}

impl AttendanceRow {
    pub fn into_entry(self) -> (RecordKey, AttendanceRecord) {
        (
            RecordKey::from(self.id),
            AttendanceRecord {
                group_id: self.group_id,
                student_id: self.student_id,
                date: self.date,
            },
        )
    }
}
