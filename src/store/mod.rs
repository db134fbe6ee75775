//! Remote collaborators the attendance workflow talks to.
//!
//! Both traits are object safe so handlers can take them as
//! `web::Data<dyn AttendanceStore>` / `web::Data<dyn RosterStore>` and tests
//! can swap in the in-memory store.

pub mod mysql;

#[cfg(test)]
pub mod memory;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use actix_web::rt::time::timeout;
use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;

use crate::model::attendance::{AttendanceRecord, RecordKey};
use crate::model::group::{Group, GroupMembership};
use crate::model::student::Student;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),

    #[display(fmt = "request timed out after {:?}", _0)]
    Timeout(Duration),

    #[display(fmt = "invalid record key: {}", _0)]
    InvalidKey(RecordKey),

    #[display(fmt = "malformed row: {}", _0)]
    Decode(String),

    #[display(fmt = "store unavailable: {}", _0)]
    Unavailable(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Attendance records of a group, kept by the remote store.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Full snapshot of a group's attendance.
    async fn list_attendance(
        &self,
        group_id: u64,
    ) -> Result<HashMap<RecordKey, AttendanceRecord>, StoreError>;

    /// Creates a record. The new key is not returned; see `resolve_attendance_key`.
    async fn create_attendance(
        &self,
        date: NaiveDate,
        group_id: u64,
        student_id: u64,
    ) -> Result<(), StoreError>;

    async fn resolve_attendance_key(
        &self,
        group_id: u64,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Option<RecordKey>, StoreError>;

    async fn delete_attendance(&self, key: &RecordKey) -> Result<(), StoreError>;
}

/// Read side of groups, students and who is enrolled where.
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn find_group(&self, group_id: u64) -> Result<Option<Group>, StoreError>;

    /// Students enrolled in the group, ordered by name.
    async fn group_students(&self, group_id: u64) -> Result<Vec<Student>, StoreError>;

    async fn find_student(&self, student_id: u64) -> Result<Option<Student>, StoreError>;

    /// Every group the student is enrolled in, in no particular order.
    async fn student_groups(&self, student_id: u64) -> Result<Vec<GroupMembership>, StoreError>;
}

/// Runs one store call under `limit`, reporting an elapsed limit as [`StoreError::Timeout`].
pub async fn within<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
