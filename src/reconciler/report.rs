use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::{CellKey, RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    /// The store accepted the change; `key` is the record created or removed.
    Applied { key: RecordKey },
    /// Created remotely, but the new record could not be found afterwards.
    Unresolved,
    Failed { message: String },
    /// Skipped because an earlier change failed.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChangeReport {
    pub student_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub action: ChangeAction,
    #[serde(flatten)]
    pub status: ChangeStatus,
}

/// Outcome of one save, change by change, in the order they were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SaveReport {
    pub changes: Vec<ChangeReport>,
}

impl SaveReport {
    pub(super) fn record(&mut self, cell: CellKey, action: ChangeAction, status: ChangeStatus) {
        self.changes.push(ChangeReport {
            student_id: cell.student_id,
            date: cell.date,
            action,
            status,
        });
    }

    /// True when nothing failed or was skipped.
    pub fn is_complete(&self) -> bool {
        self.failure().is_none()
            && !self
                .changes
                .iter()
                .any(|c| c.status == ChangeStatus::NotAttempted)
    }

    /// The failure that stopped the save, if any.
    pub fn failure(&self) -> Option<&str> {
        self.changes.iter().find_map(|c| match &c.status {
            ChangeStatus::Failed { message } => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn applied(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.status, ChangeStatus::Applied { .. }))
            .count()
    }

    /// The single line shown to staff.
    pub fn message(&self) -> String {
        match self.failure() {
            Some(reason) => format!("Failed to save attendance: {}", reason),
            None => "Attendance saved".to_string(),
        }
    }
}
