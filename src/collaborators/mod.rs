//! External collaborators consumed by the core services.
//!
//! The services never talk to a database directly. They depend on these
//! traits, which the binary satisfies with [`postgres`] implementations and
//! the tests with [`memory`] ones. Every call goes through
//! [`upstream::UpstreamPolicy`], which owns timeout, cancellation and retry.

use std::sync::Arc;

use rollcall_models::{AttendanceRecord, Credential, LessonId, LessonSchedule, SubjectId};

pub mod memory;
pub mod postgres;
pub mod upstream;

pub use upstream::UpstreamPolicy;

/// Stored credentials keyed by subject.
#[async_trait::async_trait]
pub trait CredentialLookup: Send + Sync {
    async fn find_by_subject(&self, subject_id: &SubjectId) -> anyhow::Result<Option<Credential>>;

    /// Replaces the stored hash, e.g. when rotating a legacy digest.
    async fn replace_secret_hash(&self, subject_id: &SubjectId, secret_hash: &str)
    -> anyhow::Result<()>;

    /// Returns `false` when the subject already exists.
    async fn insert(&self, credential: &Credential) -> anyhow::Result<bool>;
}

#[async_trait::async_trait]
pub trait ScheduleLookup: Send + Sync {
    async fn find_lesson(&self, lesson_id: &LessonId) -> anyhow::Result<Option<LessonSchedule>>;
}

#[async_trait::async_trait]
pub trait AttendancePersist: Send + Sync {
    async fn persist(&self, record: &AttendanceRecord) -> anyhow::Result<()>;

    async fn load(&self, lesson_id: &LessonId) -> anyhow::Result<Vec<AttendanceRecord>>;
}

pub type CredentialLookupPtr = Arc<dyn CredentialLookup>;
pub type ScheduleLookupPtr = Arc<dyn ScheduleLookup>;
pub type AttendancePersistPtr = Arc<dyn AttendancePersist>;
