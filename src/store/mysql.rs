use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::StreamExt;
use sqlx::MySqlPool;
use tracing::debug;

use super::{AttendanceStore, RosterStore, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceRow, RecordKey};
use crate::model::group::{Group, GroupMembership, GroupRow};
use crate::model::student::{Student, StudentRow};

pub const GROUP_COLUMNS: &str = r#"
    g.id, g.name, g.instructor_id, i.name AS instructor,
    g.day, g.start_time, g.end_time, g.level, g.start_date
"#;

/// MySQL-backed attendance and roster store.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn is_duplicate(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn list_attendance(
        &self,
        group_id: u64,
    ) -> Result<HashMap<RecordKey, AttendanceRecord>, StoreError> {
        let mut stream = sqlx::query_as::<_, AttendanceRow>(
            r#"
            SELECT id, group_id, student_id, date
            FROM attendance
            WHERE group_id = ?
            "#,
        )
        .bind(group_id)
        .fetch(&self.pool);

        let mut records = HashMap::new();
        while let Some(row) = stream.next().await {
            let (key, record) = row?.into_entry();
            records.insert(key, record);
        }

        debug!(group_id, records = records.len(), "Loaded attendance snapshot");
        Ok(records)
    }

    async fn create_attendance(
        &self,
        date: NaiveDate,
        group_id: u64,
        student_id: u64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance (group_id, student_id, date)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(group_id)
        .bind(student_id)
        .bind(date)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Presence is boolean: someone else already marked this student.
            Err(e) if is_duplicate(&e) => {
                debug!(group_id, student_id, %date, "Attendance already recorded");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_attendance_key(
        &self,
        group_id: u64,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Option<RecordKey>, StoreError> {
        let id = sqlx::query_scalar::<_, u64>(
            r#"
            SELECT id
            FROM attendance
            WHERE group_id = ? AND student_id = ? AND date = ?
            LIMIT 1
            "#,
        )
        .bind(group_id)
        .bind(student_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(RecordKey::from))
    }

    async fn delete_attendance(&self, key: &RecordKey) -> Result<(), StoreError> {
        let id: u64 = key
            .as_str()
            .parse()
            .map_err(|_| StoreError::InvalidKey(key.clone()))?;

        let result = sqlx::query("DELETE FROM attendance WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(%key, "Attendance record was already gone");
        }
        Ok(())
    }
}

#[async_trait]
impl RosterStore for MySqlStore {
    async fn find_group(&self, group_id: u64) -> Result<Option<Group>, StoreError> {
        let sql = format!(
            "SELECT {} FROM dance_groups g JOIN instructors i ON i.id = g.instructor_id WHERE g.id = ?",
            GROUP_COLUMNS
        );

        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Group::try_from)
            .transpose()
            .map_err(StoreError::Decode)
    }

    async fn group_students(&self, group_id: u64) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT s.id, s.name, s.phone, s.email, s.gender, s.birthday,
                   s.emergency_name, s.emergency_phone, s.payment_status, s.payment_date
            FROM students s
            JOIN student_groups sg ON sg.student_id = s.id
            WHERE sg.group_id = ?
            ORDER BY s.name
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Student::try_from(row).map_err(StoreError::Decode))
            .collect()
    }

    async fn find_student(&self, student_id: u64) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT id, name, phone, email, gender, birthday,
                   emergency_name, emergency_phone, payment_status, payment_date
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Student::try_from)
            .transpose()
            .map_err(StoreError::Decode)
    }

    async fn student_groups(&self, student_id: u64) -> Result<Vec<GroupMembership>, StoreError> {
        let groups = sqlx::query_as::<_, GroupMembership>(
            r#"
            SELECT g.id, g.name, g.level, g.instructor_id, sg.is_primary
            FROM student_groups sg
            JOIN dance_groups g ON g.id = sg.group_id
            WHERE sg.student_id = ?
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }
}
