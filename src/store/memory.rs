use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{AttendanceStore, RosterStore, StoreError};
use crate::model::attendance::{AttendanceRecord, RecordKey};
use crate::model::group::{Group, GroupMembership};
use crate::model::student::Student;

#[derive(Default)]
struct State {
    records: BTreeMap<RecordKey, AttendanceRecord>,
    next_id: u64,
    groups: HashMap<u64, Group>,
    students: HashMap<u64, Vec<Student>>,
    people: HashMap<u64, Student>,
    memberships: HashMap<u64, Vec<GroupMembership>>,
    failing_creates: HashSet<(u64, NaiveDate)>,
    failing_deletes: HashSet<RecordKey>,
    failing_resolves: HashSet<(u64, NaiveDate)>,
    unresolvable: HashSet<(u64, NaiveDate)>,
    calls: Vec<String>,
}

/// Store double with per-call failure injection. Keys are `rec-<n>`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, key: &str, group_id: u64, student_id: u64, date: NaiveDate) -> Self {
        self.lock().records.insert(
            RecordKey::new(key),
            AttendanceRecord {
                group_id,
                student_id,
                date,
            },
        );
        self
    }

    pub fn with_next_id(self, id: u64) -> Self {
        self.lock().next_id = id;
        self
    }

    pub fn with_group(self, group: Group, students: Vec<Student>) -> Self {
        {
            let mut state = self.lock();
            for student in &students {
                state.people.insert(student.id, student.clone());
            }
            state.students.insert(group.id, students);
            state.groups.insert(group.id, group);
        }
        self
    }

    /// A student card with the groups listed on it, in the given order.
    pub fn with_student(self, student: Student, memberships: Vec<GroupMembership>) -> Self {
        {
            let mut state = self.lock();
            state.memberships.insert(student.id, memberships);
            state.people.insert(student.id, student);
        }
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_create(&self, student_id: u64, date: NaiveDate) {
        self.lock().failing_creates.insert((student_id, date));
    }

    pub fn fail_delete(&self, key: &str) {
        self.lock().failing_deletes.insert(RecordKey::new(key));
    }

    /// The next lookup for this cell fails; later ones succeed.
    pub fn fail_resolve_once(&self, student_id: u64, date: NaiveDate) {
        self.lock().failing_resolves.insert((student_id, date));
    }

    /// Creates for this cell succeed but can never be found again.
    pub fn lose_created(&self, student_id: u64, date: NaiveDate) {
        self.lock().unresolvable.insert((student_id, date));
    }

    pub fn records(&self) -> BTreeMap<RecordKey, AttendanceRecord> {
        self.lock().records.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            actix_web::rt::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn list_attendance(
        &self,
        group_id: u64,
    ) -> Result<HashMap<RecordKey, AttendanceRecord>, StoreError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.push(format!("list {}", group_id));
        Ok(state
            .records
            .iter()
            .filter(|(_, r)| r.group_id == group_id)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect())
    }

    async fn create_attendance(
        &self,
        date: NaiveDate,
        group_id: u64,
        student_id: u64,
    ) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.push(format!("create {} {}", student_id, date));
        if state.failing_creates.contains(&(student_id, date)) {
            return Err(StoreError::Unavailable("create rejected".to_string()));
        }
        // One record per cell, as the unique index enforces.
        if state
            .records
            .values()
            .any(|r| r.group_id == group_id && r.student_id == student_id && r.date == date)
        {
            return Ok(());
        }
        state.next_id += 1;
        let key = RecordKey::new(format!("rec-{}", state.next_id));
        state.records.insert(
            key,
            AttendanceRecord {
                group_id,
                student_id,
                date,
            },
        );
        Ok(())
    }

    async fn resolve_attendance_key(
        &self,
        group_id: u64,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Option<RecordKey>, StoreError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.push(format!("resolve {} {}", student_id, date));
        if state.failing_resolves.remove(&(student_id, date)) {
            return Err(StoreError::Unavailable("resolve rejected".to_string()));
        }
        if state.unresolvable.contains(&(student_id, date)) {
            return Ok(None);
        }
        Ok(state
            .records
            .iter()
            .find(|(_, r)| r.group_id == group_id && r.student_id == student_id && r.date == date)
            .map(|(k, _)| k.clone()))
    }

    async fn delete_attendance(&self, key: &RecordKey) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.push(format!("delete {}", key));
        if state.failing_deletes.contains(key) {
            return Err(StoreError::Unavailable("delete rejected".to_string()));
        }
        state.records.remove(key);
        Ok(())
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
    async fn find_group(&self, group_id: u64) -> Result<Option<Group>, StoreError> {
        Ok(self.lock().groups.get(&group_id).cloned())
    }

    async fn group_students(&self, group_id: u64) -> Result<Vec<Student>, StoreError> {
        Ok(self
            .lock()
            .students
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_student(&self, student_id: u64) -> Result<Option<Student>, StoreError> {
        Ok(self.lock().people.get(&student_id).cloned())
    }

    async fn student_groups(&self, student_id: u64) -> Result<Vec<GroupMembership>, StoreError> {
        Ok(self
            .lock()
            .memberships
            .get(&student_id)
            .cloned()
            .unwrap_or_default())
    }
}
