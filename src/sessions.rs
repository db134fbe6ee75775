use std::sync::Arc;
use std::time::Duration;

use futures::lock::Mutex;
use moka::future::Cache;
use tracing::debug;

use crate::reconciler::Reconciler;
use crate::store::{AttendanceStore, StoreError};

pub type SharedReconciler = Arc<Mutex<Reconciler>>;

/// Open attendance edit sessions, one per (user, group).
///
/// A session that sits idle past its TTL is evicted, which discards any
/// unsaved toggles just like a cancel.
#[derive(Clone)]
pub struct EditSessions {
    sessions: Cache<(u64, u64), SharedReconciler>,
    call_timeout: Duration,
}

impl EditSessions {
    pub fn new(ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(ttl)
                .build(),
            call_timeout,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub async fn get(&self, user_id: u64, group_id: u64) -> Option<SharedReconciler> {
        self.sessions.get(&(user_id, group_id)).await
    }

    /// Returns the user's session for the group, loading a fresh baseline
    /// when there is none.
    pub async fn open(
        &self,
        user_id: u64,
        group_id: u64,
        store: &dyn AttendanceStore,
    ) -> Result<SharedReconciler, StoreError> {
        if let Some(session) = self.get(user_id, group_id).await {
            return Ok(session);
        }

        let reconciler = Reconciler::load(store, group_id, self.call_timeout).await?;
        let session = Arc::new(Mutex::new(reconciler));
        self.sessions
            .insert((user_id, group_id), session.clone())
            .await;

        debug!(user_id, group_id, "Opened attendance session");
        Ok(session)
    }

    pub async fn close(&self, user_id: u64, group_id: u64) {
        self.sessions.invalidate(&(user_id, group_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;

    #[actix_web::test]
    async fn sessions_are_per_user_and_group() {
        let may6 = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let store = MemoryStore::new().with_record("rec-1", 7, 1, may6);
        let sessions = EditSessions::new(Duration::from_secs(60), Duration::from_secs(5));

        let first = sessions.open(1, 7, &store).await.unwrap();
        first.lock().await.enter_edit_mode().unwrap();

        let again = sessions.open(1, 7, &store).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(again.lock().await.is_editing());

        let other_user = sessions.open(2, 7, &store).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other_user));
        assert!(!other_user.lock().await.is_editing());

        // Opening reuses the cached baseline instead of reloading it.
        assert_eq!(store.calls().len(), 2);
    }

    #[actix_web::test]
    async fn closing_forgets_the_session() {
        let store = MemoryStore::new();
        let sessions = EditSessions::new(Duration::from_secs(60), Duration::from_secs(5));

        sessions.open(1, 7, &store).await.unwrap();
        assert!(sessions.get(1, 7).await.is_some());

        sessions.close(1, 7).await;
        assert!(sessions.get(1, 7).await.is_none());
    }
}
