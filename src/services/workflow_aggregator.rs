//! Session matching and ownership.
//!
//! The aggregator is the single writer for session state. Every mutation
//! goes through one mutex, so tasks in a session keep arrival order and no
//! two batches can race on the same session. Persistence is best effort:
//! failures are logged and the in-memory state stays authoritative for the
//! life of the process.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::task_classifier::classify_batch;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    derive_session_id, is_permitted_continuation, time_bucket, ChangeBatch, ProposalRef, Session,
    SessionStatus, Task, WorkflowConfig,
};
use crate::domain::ports::SessionRepository;

pub struct WorkflowAggregator {
    /// Sessions known to this process, in creation order.
    sessions: Mutex<Vec<Session>>,
    repo: Arc<dyn SessionRepository>,
    match_window: Duration,
}

impl WorkflowAggregator {
    pub fn new(repo: Arc<dyn SessionRepository>, config: &WorkflowConfig) -> Self {
        let window = i64::try_from(config.match_window_seconds).unwrap_or(i64::MAX / 1000);
        Self {
            sessions: Mutex::new(Vec::new()),
            repo,
            match_window: Duration::seconds(window),
        }
    }

    /// Load active sessions from the store. An unreadable store leaves the
    /// aggregator empty.
    pub async fn load(&self) -> usize {
        match self.repo.list_by_status(SessionStatus::Active).await {
            Ok(mut loaded) => {
                loaded.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
                let count = loaded.len();
                *self.sessions.lock().await = loaded;
                info!(count, "loaded active sessions");
                count
            }
            Err(e) => {
                warn!(error = %e, "could not load persisted sessions; starting with none");
                self.sessions.lock().await.clear();
                0
            }
        }
    }

    /// Match a task into a session, creating one if nothing matches.
    pub async fn add_task(
        &self,
        task_type: &str,
        files: Vec<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> String {
        self.record_task(Task::new(task_type, files, confidence, timestamp)).await
    }

    #[instrument(skip(self, task), fields(task_type = %task.task_type, files = task.files.len()))]
    pub async fn record_task(&self, task: Task) -> String {
        let mut sessions = self.sessions.lock().await;

        if let Some(index) = sessions.iter().position(|s| self.matches(s, &task)) {
            let session = &mut sessions[index];
            session.add_task(task);
            debug!(session_id = %session.id, tasks = session.tasks.len(), "task joined session");
            self.persist(session).await;
            return session.id.clone();
        }

        let bucket = time_bucket(task.timestamp);
        let id = self.unique_id(&sessions, &task.files, bucket).await;
        let session = Session::start(id.clone(), task);
        info!(session_id = %id, bucket, "started session");
        self.persist(&session).await;
        sessions.push(session);
        id
    }

    /// Classify a flushed batch, record it as a task and keep its raw
    /// changes for the proposal. Returns the session it landed in.
    pub async fn ingest_batch(&self, batch: &ChangeBatch) -> Option<String> {
        let timestamp = batch.latest_timestamp()?;
        let (task_type, confidence) = classify_batch(batch);
        let task = Task::new(task_type, batch.paths(), confidence, timestamp)
            .with_lines(batch.lines_changed());

        let session_id = self.record_task(task).await;
        if let Err(e) = self.repo.record_changes(&session_id, &batch.events).await {
            warn!(session_id = %session_id, error = %e, "failed to persist session changes");
        }
        Some(session_id)
    }

    fn matches(&self, session: &Session, task: &Task) -> bool {
        if !session.is_active() || !session.overlaps(&task.files) {
            return false;
        }
        let recent = task.timestamp - session.last_activity < self.match_window;
        let adjacent_bucket = (time_bucket(task.timestamp) - session.time_window_bucket).abs() <= 1;
        (recent || adjacent_bucket) && is_permitted_continuation(session.last_task_type(), &task.task_type)
    }

    async fn unique_id(&self, sessions: &[Session], files: &[String], bucket: i64) -> String {
        let mut attempt = 0;
        loop {
            let id = derive_session_id(files, bucket, attempt);
            let known_here = sessions.iter().any(|s| s.id == id);
            let known_in_store = !known_here
                && match self.repo.get(&id).await {
                    Ok(found) => found.is_some(),
                    Err(e) => {
                        debug!(session_id = %id, error = %e, "session id lookup failed; assuming unused");
                        false
                    }
                };
            if !known_here && !known_in_store {
                return id;
            }
            attempt += 1;
        }
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.repo.upsert(session).await {
            warn!(session_id = %session.id, error = %e, "failed to persist session");
        }
    }

    /// Complete every active session idle for longer than `max_age_minutes`.
    pub async fn cleanup_stale(&self, max_age_minutes: u64) -> Vec<String> {
        self.cleanup_stale_at(max_age_minutes, Utc::now()).await
    }

    pub async fn cleanup_stale_at(&self, max_age_minutes: u64, now: DateTime<Utc>) -> Vec<String> {
        self.sweep_stale(max_age_minutes, now, &HashSet::new()).await
    }

    /// [`Self::cleanup_stale_at`], leaving the sessions in `skip` active
    /// (their proposal is being created).
    pub async fn sweep_stale(
        &self,
        max_age_minutes: u64,
        now: DateTime<Utc>,
        skip: &HashSet<String>,
    ) -> Vec<String> {
        let max_age = Duration::minutes(i64::try_from(max_age_minutes).unwrap_or(i64::MAX / 60_000));
        let mut sessions = self.sessions.lock().await;
        let mut completed = Vec::new();
        for session in sessions.iter_mut() {
            if session.is_active() && !skip.contains(&session.id) && now - session.last_activity > max_age {
                session.complete();
                self.persist(session).await;
                completed.push(session.id.clone());
            }
        }
        if !completed.is_empty() {
            info!(count = completed.len(), "completed stale sessions");
        }
        completed
    }

    /// Store the proposal on the session and complete it.
    pub async fn attach_proposal(&self, session_id: &str, proposal: ProposalRef) -> DomainResult<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
            session.proposal = Some(proposal);
            session.complete();
            self.persist(session).await;
            return Ok(());
        }

        let mut session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_string()))?;
        session.proposal = Some(proposal);
        session.complete();
        self.persist(&session).await;
        sessions.push(session);
        Ok(())
    }

    /// Look a session up in memory, then in the store.
    pub async fn get(&self, session_id: &str) -> DomainResult<Option<Session>> {
        if let Some(session) = self.sessions.lock().await.iter().find(|s| s.id == session_id) {
            return Ok(Some(session.clone()));
        }
        self.repo.get(session_id).await
    }

    pub async fn list_active(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .await
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::models::{ChangeType, FileChangeEvent, FlushReason};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 3, 0).unwrap()
    }

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| (*p).to_string()).collect()
    }

    fn aggregator_with(store: Arc<InMemoryStore>) -> WorkflowAggregator {
        WorkflowAggregator::new(store, &WorkflowConfig::default())
    }

    #[tokio::test]
    async fn test_overlapping_continuation_joins_session() {
        let agg = aggregator_with(Arc::new(InMemoryStore::new()));
        let first = agg.add_task("edit_code", files(&["a.py"]), 0.9, t0()).await;
        let second = agg
            .add_task("run_tests", files(&["a.py"]), 0.8, t0() + Duration::seconds(120))
            .await;

        assert_eq!(first, second);
        let session = agg.get(&first).await.unwrap().unwrap();
        assert_eq!(session.tasks.len(), 2);
        assert_eq!(session.last_activity, t0() + Duration::seconds(120));
    }

    #[tokio::test]
    async fn test_disjoint_files_far_apart_start_new_session() {
        let agg = aggregator_with(Arc::new(InMemoryStore::new()));
        let first = agg.add_task("edit_code", files(&["a.py"]), 0.9, t0()).await;
        let second = agg
            .add_task("edit_code", files(&["b.py"]), 0.9, t0() + Duration::minutes(20))
            .await;
        assert_ne!(first, second);
        assert_eq!(agg.list_active().await.len(), 2);
    }

    #[tokio::test]
    async fn test_disallowed_continuation_gets_distinct_id() {
        let agg = aggregator_with(Arc::new(InMemoryStore::new()));
        let first = agg.add_task("commit", files(&["a.py"]), 1.0, t0()).await;
        let second = agg.add_task("write_docs", files(&["a.py"]), 1.0, t0()).await;
        assert_ne!(first, second);
        assert_eq!(second, derive_session_id(&files(&["a.py"]), time_bucket(t0()), 1));
    }

    #[tokio::test]
    async fn test_file_set_never_shrinks() {
        let agg = aggregator_with(Arc::new(InMemoryStore::new()));
        let id = agg.add_task("edit_code", files(&["a.rs", "b.rs"]), 1.0, t0()).await;
        let mut previous = 2;
        for (i, set) in [vec!["a.rs"], vec!["b.rs", "c.rs"], vec!["a.rs"]].into_iter().enumerate() {
            let at = t0() + Duration::seconds(30 * (i as i64 + 1));
            assert_eq!(agg.add_task("edit_code", files(&set), 1.0, at).await, id);
            let size = agg.get(&id).await.unwrap().unwrap().files.len();
            assert!(size >= previous);
            previous = size;
        }
        assert_eq!(previous, 3);
    }

    #[tokio::test]
    async fn test_cleanup_completes_idle_sessions() {
        let agg = aggregator_with(Arc::new(InMemoryStore::new()));
        let old = agg.add_task("edit_code", files(&["a.rs"]), 1.0, t0()).await;
        let fresh = agg
            .add_task("edit_code", files(&["z.rs"]), 1.0, t0() + Duration::minutes(90))
            .await;

        let completed = agg.cleanup_stale_at(60, t0() + Duration::minutes(100)).await;
        assert_eq!(completed, vec![old.clone()]);
        let active: Vec<String> = agg.list_active().await.into_iter().map(|s| s.id).collect();
        assert_eq!(active, vec![fresh]);
        assert_eq!(agg.get(&old).await.unwrap().unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_sweep_leaves_skipped_sessions_active() {
        let agg = aggregator_with(Arc::new(InMemoryStore::new()));
        let proposing = agg.add_task("edit_code", files(&["a.rs"]), 1.0, t0()).await;
        let idle = agg
            .add_task("edit_code", files(&["z.rs"]), 1.0, t0() + Duration::minutes(90))
            .await;

        let skip = HashSet::from([proposing.clone()]);
        let completed = agg.sweep_stale(60, t0() + Duration::minutes(200), &skip).await;
        assert_eq!(completed, vec![idle]);
        assert!(agg.get(&proposing).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_store_outage_keeps_in_memory_state() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let agg = aggregator_with(store.clone());
        assert_eq!(agg.load().await, 0);

        let id = agg.add_task("edit_code", files(&["a.rs"]), 1.0, t0()).await;
        assert_eq!(agg.list_active().await.len(), 1);
        assert!(agg.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ingest_batch_records_task_and_changes() {
        let store = Arc::new(InMemoryStore::new());
        let agg = aggregator_with(store.clone());
        let batch = ChangeBatch {
            events: vec![
                FileChangeEvent::new("src/lib.rs", ChangeType::Modified, t0()).with_lines(12, 3),
                FileChangeEvent::new("src/api.rs", ChangeType::Added, t0()).with_lines(40, 0),
            ],
            reason: FlushReason::Idle,
        };

        let id = agg.ingest_batch(&batch).await.unwrap();
        let session = agg.get(&id).await.unwrap().unwrap();
        assert_eq!(session.last_task_type(), Some("edit_code"));
        assert_eq!(session.total_lines(), 55);

        let changes = store.list_unprocessed_changes(&id).await.unwrap();
        assert_eq!(changes.len(), 2);
    }

    #[tokio::test]
    async fn test_load_restores_persisted_sessions() {
        let store = Arc::new(InMemoryStore::new());
        let id = aggregator_with(store.clone())
            .add_task("edit_code", files(&["a.rs"]), 1.0, t0())
            .await;

        let restarted = aggregator_with(store);
        assert_eq!(restarted.load().await, 1);
        let joined = restarted
            .add_task("run_tests", files(&["a.rs"]), 1.0, t0() + Duration::seconds(60))
            .await;
        assert_eq!(joined, id);
    }
}
