//! Edit-session bookkeeping for a group's attendance sheet.
//!
//! A [`Reconciler`] holds the last confirmed attendance of one group (the
//! baseline) and the cells toggled since edit mode was entered. Nothing
//! reaches the store until [`Reconciler::save`]; [`Reconciler::cancel`]
//! simply forgets the toggles.
//!
//! Saves are not transactional. Changes are applied one at a time in
//! ascending `(student_id, date)` order and the first failure stops the
//! loop: earlier changes stay applied remotely and are folded into the
//! baseline, the failed change and everything after it stay pending. The
//! returned [`SaveReport`] says which is which.

mod report;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::NaiveDate;
use derive_more::Display;
use serde::Serialize;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

pub use report::{ChangeAction, ChangeReport, ChangeStatus, SaveReport};

use crate::model::attendance::{AttendanceRecord, CellKey, RecordKey};
use crate::store::{AttendanceStore, StoreError, within};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Viewing,
    Editing,
}

/// An unconfirmed toggle of one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Add(AttendanceRecord),
    Delete(RecordKey),
}

impl PendingChange {
    pub fn action(&self) -> ChangeAction {
        match self {
            PendingChange::Add(_) => ChangeAction::Add,
            PendingChange::Delete(_) => ChangeAction::Delete,
        }
    }
}

/// What a cell of the sheet shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Present,
    AbsentEditable,
    AbsentReadonly,
    PendingAdd,
    PendingDelete,
}

/// Result of clicking a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    /// Not editing; the click does nothing.
    Ignored,
    PendingAdd,
    PendingDelete,
    /// A pending change on the cell was withdrawn.
    Reverted,
}

#[derive(Debug, Display)]
pub enum ReconcileError {
    #[display(fmt = "attendance is already being edited")]
    AlreadyEditing,

    #[display(fmt = "attendance is not being edited")]
    NotEditing,
}

impl std::error::Error for ReconcileError {}

#[derive(Debug, Clone)]
pub struct Reconciler {
    group_id: u64,
    baseline: HashMap<RecordKey, AttendanceRecord>,
    present: HashMap<CellKey, RecordKey>,
    pending: BTreeMap<CellKey, PendingChange>,
    mode: EditMode,
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        group_id: u64,
        baseline: HashMap<RecordKey, AttendanceRecord>,
        call_timeout: Duration,
    ) -> Self {
        let mut reconciler = Self {
            group_id,
            baseline,
            present: HashMap::new(),
            pending: BTreeMap::new(),
            mode: EditMode::Viewing,
            call_timeout,
        };
        reconciler.reindex();
        reconciler
    }

    /// Reads the group's attendance from the store into a fresh, viewing reconciler.
    pub async fn load(
        store: &dyn AttendanceStore,
        group_id: u64,
        call_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let baseline = within(call_timeout, store.list_attendance(group_id)).await?;
        Ok(Self::new(group_id, baseline, call_timeout))
    }

    /// Replaces the baseline with the store's current snapshot.
    pub async fn refresh(&mut self, store: &dyn AttendanceStore) -> Result<(), StoreError> {
        self.baseline = within(self.call_timeout, store.list_attendance(self.group_id)).await?;
        self.reindex();
        Ok(())
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == EditMode::Editing
    }

    pub fn baseline(&self) -> &HashMap<RecordKey, AttendanceRecord> {
        &self.baseline
    }

    pub fn pending(&self) -> &BTreeMap<CellKey, PendingChange> {
        &self.pending
    }

    pub fn enter_edit_mode(&mut self) -> Result<(), ReconcileError> {
        if self.is_editing() {
            return Err(ReconcileError::AlreadyEditing);
        }
        self.mode = EditMode::Editing;
        Ok(())
    }

    pub fn toggle_cell(&mut self, student_id: u64, date: NaiveDate) -> Toggle {
        if !self.is_editing() {
            return Toggle::Ignored;
        }

        let cell = CellKey { student_id, date };
        // A pending change is always the inverse of the baseline, so
        // dropping it restores what the baseline shows.
        match (self.pending.remove(&cell), self.present.get(&cell)) {
            (Some(_), _) => Toggle::Reverted,
            (None, Some(key)) => {
                self.pending.insert(cell, PendingChange::Delete(key.clone()));
                Toggle::PendingDelete
            }
            (None, None) => {
                let record = AttendanceRecord {
                    group_id: self.group_id,
                    student_id,
                    date,
                };
                self.pending.insert(cell, PendingChange::Add(record));
                Toggle::PendingAdd
            }
        }
    }

    pub fn cell_state(&self, student_id: u64, date: NaiveDate) -> CellState {
        let cell = CellKey { student_id, date };
        match self.pending.get(&cell) {
            Some(PendingChange::Add(_)) => CellState::PendingAdd,
            Some(PendingChange::Delete(_)) => CellState::PendingDelete,
            None if self.present.contains_key(&cell) => CellState::Present,
            None if self.is_editing() => CellState::AbsentEditable,
            None => CellState::AbsentReadonly,
        }
    }

    /// Leaves edit mode and pushes every pending change to the store.
    #[instrument(
        name = "attendance_save",
        skip(self, store),
        fields(group_id = self.group_id, pending = self.pending.len())
    )]
    pub async fn save(&mut self, store: &dyn AttendanceStore) -> Result<SaveReport, ReconcileError> {
        if !self.is_editing() {
            return Err(ReconcileError::NotEditing);
        }
        self.mode = EditMode::Viewing;

        let queue: Vec<(CellKey, PendingChange)> = self
            .pending
            .iter()
            .map(|(cell, change)| (*cell, change.clone()))
            .collect();

        let mut report = SaveReport::default();
        let mut stopped = false;

        for (cell, change) in queue {
            let action = change.action();
            if stopped {
                report.record(cell, action, ChangeStatus::NotAttempted);
                continue;
            }

            match self.apply(store, &change).await {
                Ok(Some(key)) => {
                    self.pending.remove(&cell);
                    report.record(cell, action, ChangeStatus::Applied { key });
                }
                Ok(None) => {
                    self.pending.remove(&cell);
                    warn!(
                        student_id = cell.student_id,
                        date = %cell.date,
                        "Created attendance could not be resolved; dropped from local view"
                    );
                    report.record(cell, action, ChangeStatus::Unresolved);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        student_id = cell.student_id,
                        date = %cell.date,
                        "Failed to apply attendance change"
                    );
                    report.record(
                        cell,
                        action,
                        ChangeStatus::Failed {
                            message: e.to_string(),
                        },
                    );
                    stopped = true;
                }
            }
        }

        self.reindex();
        debug!(applied = report.applied(), left = self.pending.len(), "Save finished");
        Ok(report)
    }

    /// Drops every pending change without touching the store.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.mode = EditMode::Viewing;
    }

    async fn apply(
        &mut self,
        store: &dyn AttendanceStore,
        change: &PendingChange,
    ) -> Result<Option<RecordKey>, StoreError> {
        match change {
            PendingChange::Delete(key) => {
                within(self.call_timeout, store.delete_attendance(key)).await?;
                self.baseline.remove(key);
                Ok(Some(key.clone()))
            }
            PendingChange::Add(record) => {
                within(
                    self.call_timeout,
                    store.create_attendance(record.date, record.group_id, record.student_id),
                )
                .await?;

                let resolved = within(
                    self.call_timeout,
                    store.resolve_attendance_key(record.group_id, record.student_id, record.date),
                )
                .await?;

                if let Some(key) = &resolved {
                    self.baseline.insert(key.clone(), record.clone());
                }
                Ok(resolved)
            }
        }
    }

    fn reindex(&mut self) {
        self.present = self
            .baseline
            .iter()
            .map(|(key, record)| (record.cell(), key.clone()))
            .collect();
    }
}
