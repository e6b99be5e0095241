//! In-process collaborators for tests and local runs.
//!
//! Each store carries a [`FailureSwitch`] so tests can make the next reads or
//! every write fail, and an optional artificial latency.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use rollcall_models::{AttendanceRecord, Credential, LessonId, LessonSchedule, SubjectId};

use super::{AttendancePersist, CredentialLookup, ScheduleLookup};

#[derive(Debug, Default)]
pub struct FailureSwitch {
    failing_reads: AtomicU32,
    failing_writes: AtomicBool,
    latency_ms: AtomicU64,
    reads: AtomicU32,
    writes: AtomicU32,
}

impl FailureSwitch {
    /// The next `count` reads return an error.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn on_read(&self, operation: &str) -> anyhow::Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("injected failure in {}", operation);
        }
        Ok(())
    }

    async fn on_write(&self, operation: &str) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.failing_writes.load(Ordering::SeqCst) {
            anyhow::bail!("injected failure in {}", operation);
        }
        Ok(())
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    credentials: RwLock<HashMap<SubjectId, Credential>>,
    pub failures: FailureSwitch,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let store = Self::new();
        {
            let mut map = store.credentials.write().unwrap_or_else(|e| e.into_inner());
            for credential in credentials {
                map.insert(credential.subject_id.clone(), credential);
            }
        }
        store
    }

    pub fn stored_hash(&self, subject_id: &SubjectId) -> Option<String> {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(subject_id)
            .map(|c| c.secret_hash.clone())
    }
}

#[async_trait::async_trait]
impl CredentialLookup for InMemoryCredentials {
    async fn find_by_subject(&self, subject_id: &SubjectId) -> anyhow::Result<Option<Credential>> {
        self.failures.on_read("find_by_subject").await?;
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(subject_id)
            .cloned())
    }

    async fn replace_secret_hash(
        &self,
        subject_id: &SubjectId,
        secret_hash: &str,
    ) -> anyhow::Result<()> {
        self.failures.on_write("replace_secret_hash").await?;
        let mut map = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        let credential = map
            .get_mut(subject_id)
            .ok_or_else(|| anyhow::anyhow!("no credential for {}", subject_id))?;
        credential.secret_hash = secret_hash.to_string();
        Ok(())
    }

    async fn insert(&self, credential: &Credential) -> anyhow::Result<bool> {
        self.failures.on_write("insert_credential").await?;
        let mut map = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&credential.subject_id) {
            return Ok(false);
        }
        map.insert(credential.subject_id.clone(), credential.clone());
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySchedules {
    lessons: RwLock<HashMap<LessonId, LessonSchedule>>,
    pub failures: FailureSwitch,
}

impl InMemorySchedules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, schedule: LessonSchedule) {
        self.lessons
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(schedule.lesson_id.clone(), schedule);
    }
}

#[async_trait::async_trait]
impl ScheduleLookup for InMemorySchedules {
    async fn find_lesson(&self, lesson_id: &LessonId) -> anyhow::Result<Option<LessonSchedule>> {
        self.failures.on_read("find_lesson").await?;
        Ok(self
            .lessons
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(lesson_id)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAttendance {
    records: RwLock<HashMap<(LessonId, SubjectId), AttendanceRecord>>,
    pub failures: FailureSwitch,
}

impl InMemoryAttendance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lesson_id: &LessonId, subject_id: &SubjectId) -> Option<AttendanceRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(lesson_id.clone(), subject_id.clone()))
            .cloned()
    }

    pub fn seed(&self, record: AttendanceRecord) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((record.lesson_id.clone(), record.subject_id.clone()), record);
    }
}

#[async_trait::async_trait]
impl AttendancePersist for InMemoryAttendance {
    async fn persist(&self, record: &AttendanceRecord) -> anyhow::Result<()> {
        self.failures.on_write("persist_attendance").await?;
        self.seed(record.clone());
        Ok(())
    }

    async fn load(&self, lesson_id: &LessonId) -> anyhow::Result<Vec<AttendanceRecord>> {
        self.failures.on_read("load_attendance").await?;
        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|r| &r.lesson_id == lesson_id)
            .cloned()
            .collect())
    }
}
