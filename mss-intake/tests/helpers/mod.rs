//! Shared fixtures for mss-intake integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use mss_common::EventBus;
use mss_intake::admission::{
    AdmissionError, AdmissionResult, AdmissionStore, DedupKey, Insertion, MemoryAdmissionStore,
    PlaceholderId, PlaceholderRecord, PlaceholderService, SqliteAdmissionStore, SubmissionContext,
    Transitioned,
};

/// SQLite-backed service on a throwaway database
pub struct SqliteFixture {
    pub service: Arc<PlaceholderService>,
    pub pool: sqlx::SqlitePool,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl SqliteFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("mss.db");
        let pool = mss_common::db::init_database(&db_path).await.unwrap();
        let store = Arc::new(SqliteAdmissionStore::new(pool.clone()));
        Self {
            service: Arc::new(PlaceholderService::new(store, EventBus::new(64))),
            pool,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// An independent service with its own connection pool on the same
    /// database file, standing in for another process.
    pub async fn second_instance(&self) -> Arc<PlaceholderService> {
        let pool = mss_common::db::init_database(&self.db_path).await.unwrap();
        let store = Arc::new(SqliteAdmissionStore::new(pool));
        Arc::new(PlaceholderService::new(store, EventBus::new(64)))
    }

    pub async fn row_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM placeholders")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// Memory-backed service whose store sleeps before each insert
pub fn slow_memory_service(delay: Duration) -> (Arc<PlaceholderService>, Arc<MemoryAdmissionStore>) {
    let store = Arc::new(MemoryAdmissionStore::new().with_insert_delay(delay));
    let service = Arc::new(PlaceholderService::new(store.clone(), EventBus::new(64)));
    (service, store)
}

pub fn context(tenant: i64, subject: Option<i64>, task: Option<i64>) -> SubmissionContext {
    SubmissionContext::new(tenant, subject, task).unwrap()
}

/// Store whose every operation fails as if the database were unreachable
#[derive(Default)]
pub struct UnavailableStore {
    pub calls: AtomicUsize,
}

impl UnavailableStore {
    fn fail<T>(&self) -> AdmissionResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AdmissionError::StorageUnavailable(
            "connection refused".to_string(),
        ))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdmissionStore for UnavailableStore {
    async fn try_insert(
        &self,
        _key: &DedupKey,
        _context: &SubmissionContext,
        _payload: &serde_json::Value,
    ) -> AdmissionResult<Insertion> {
        self.fail()
    }

    async fn finalize(&self, _id: PlaceholderId) -> AdmissionResult<Transitioned> {
        self.fail()
    }

    async fn abandon(&self, _id: PlaceholderId) -> AdmissionResult<Transitioned> {
        self.fail()
    }

    async fn abandon_stale(
        &self,
        _created_before: DateTime<Utc>,
    ) -> AdmissionResult<Vec<PlaceholderRecord>> {
        self.fail()
    }

    async fn get(&self, _id: PlaceholderId) -> AdmissionResult<PlaceholderRecord> {
        self.fail()
    }

    async fn history(&self, _key: &DedupKey) -> AdmissionResult<Vec<PlaceholderRecord>> {
        self.fail()
    }
}
