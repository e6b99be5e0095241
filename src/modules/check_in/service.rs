use std::sync::Arc;

use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use rollcall_config::AttendanceConfig;
use rollcall_core::{AppError, SharedClock};
use rollcall_models::{
    Actor, AttendanceRecord, AttendanceStatus, CheckInResponse, CodeKind, LessonCode, LessonId,
    LessonSchedule, SubjectId, ValidationOutcome,
};

use crate::collaborators::{ScheduleLookupPtr, UpstreamPolicy};
use crate::modules::attendance::reconciler::AttendanceReconciler;
use crate::modules::lesson_codes::registry::LessonCodeRegistry;

/// Longest code value accepted from a client.
pub const MAX_PRESENTED_CODE_LEN: usize = 128;

/// Teacher and student actions on a lesson's codes and attendance.
#[derive(Clone)]
pub struct CheckInService {
    schedules: ScheduleLookupPtr,
    registry: Arc<LessonCodeRegistry>,
    reconciler: Arc<AttendanceReconciler>,
    upstream: UpstreamPolicy,
    clock: SharedClock,
    max_code_ttl: Duration,
}

impl std::fmt::Debug for CheckInService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInService")
            .field("reconciler", &self.reconciler)
            .field("max_code_ttl", &self.max_code_ttl)
            .finish_non_exhaustive()
    }
}

impl CheckInService {
    pub fn new(
        schedules: ScheduleLookupPtr,
        registry: Arc<LessonCodeRegistry>,
        reconciler: Arc<AttendanceReconciler>,
        upstream: UpstreamPolicy,
        config: &AttendanceConfig,
        clock: SharedClock,
    ) -> Self {
        let config = config.clone().normalized();
        Self {
            schedules,
            registry,
            reconciler,
            upstream,
            clock,
            max_code_ttl: Duration::from_std(config.max_code_ttl)
                .unwrap_or_else(|_| Duration::hours(4)),
        }
    }

    pub fn registry(&self) -> &LessonCodeRegistry {
        &self.registry
    }

    pub fn reconciler(&self) -> &AttendanceReconciler {
        &self.reconciler
    }

    /// Starts a code for a lesson the actor runs. Opens the lesson's roster
    /// as Pending records on first use.
    #[instrument(skip(self, actor, cancel), fields(actor_id = %actor.subject_id))]
    pub async fn start_lesson_code(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        ttl: Option<std::time::Duration>,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<LessonCode, AppError> {
        let ttl = self.code_ttl(ttl)?;
        let schedule = self.staff_schedule(lesson_id, actor, cancel).await?;
        self.ensure_running(&schedule)?;

        self.reconciler.open_lesson(&schedule, cancel).await?;
        self.registry.start(lesson_id, kind, ttl)
    }

    #[instrument(skip(self, actor, cancel), fields(actor_id = %actor.subject_id))]
    pub async fn rotate_lesson_code(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<LessonCode, AppError> {
        let schedule = self.staff_schedule(lesson_id, actor, cancel).await?;
        self.ensure_running(&schedule)?;

        self.reconciler.open_lesson(&schedule, cancel).await?;
        self.registry.rotate(lesson_id, kind)
    }

    /// A subject presents a code. Only roster members may check in.
    ///
    /// `Expired` and `WrongValue` are returned as outcomes, not errors, so the
    /// caller can decide how to prompt. The subject is recorded on the code
    /// only after the attendance transition has been persisted.
    #[instrument(skip(self, presented, cancel))]
    pub async fn submit_code(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        presented: &str,
        subject_id: &SubjectId,
        cancel: &CancellationToken,
    ) -> Result<CheckInResponse, AppError> {
        let presented = presented.trim();
        if presented.is_empty() || presented.len() > MAX_PRESENTED_CODE_LEN {
            return Err(AppError::input_invalid(anyhow::anyhow!(
                "Code must be between 1 and {} characters",
                MAX_PRESENTED_CODE_LEN
            )));
        }

        let schedule = self.schedule(lesson_id, cancel).await?;
        if !schedule.is_on_roster(subject_id) {
            return Err(AppError::forbidden(format!(
                "Not enrolled in lesson {}",
                lesson_id
            )));
        }

        let outcome = self.registry.check(lesson_id, kind, presented, subject_id)?;
        if outcome != ValidationOutcome::Accepted {
            return Ok(CheckInResponse {
                outcome,
                record: None,
            });
        }

        let accepted_at = self.clock.now();
        let transition = self
            .reconciler
            .on_code_accepted(&schedule, subject_id, accepted_at, cancel)
            .await?;
        self.registry.commit(lesson_id, kind, presented, subject_id);

        Ok(CheckInResponse {
            outcome,
            record: Some(transition.record),
        })
    }

    #[instrument(skip(self, actor, cancel), fields(actor_id = %actor.subject_id))]
    pub async fn override_attendance(
        &self,
        lesson_id: &LessonId,
        subject_id: &SubjectId,
        status: AttendanceStatus,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<AttendanceRecord, AppError> {
        if status == AttendanceStatus::Pending {
            return Err(AppError::input_invalid(anyhow::anyhow!(
                "Attendance cannot be overridden to pending"
            )));
        }
        let schedule = self.staff_schedule(lesson_id, actor, cancel).await?;

        let transition = self
            .reconciler
            .on_manual_override(&schedule, subject_id, status, &actor.subject_id, cancel)
            .await?;
        Ok(transition.record)
    }

    pub async fn lesson_attendance(
        &self,
        lesson_id: &LessonId,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let schedule = self.staff_schedule(lesson_id, actor, cancel).await?;
        self.reconciler.lesson_attendance(&schedule, cancel).await
    }

    /// Sweeps one lesson on request. Before the lesson ends nothing changes.
    #[instrument(skip(self, actor, cancel), fields(actor_id = %actor.subject_id))]
    pub async fn sweep_lesson(
        &self,
        lesson_id: &LessonId,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<usize, AppError> {
        let schedule = self.staff_schedule(lesson_id, actor, cancel).await?;
        self.reconciler
            .sweep(&schedule, self.clock.now(), cancel)
            .await
    }

    /// Sweeps every tracked lesson that has ended and releases its state.
    ///
    /// A lesson whose sweep fails stays tracked and is retried next time.
    pub async fn sweep_ended_lessons(&self, cancel: &CancellationToken) -> usize {
        let now = self.clock.now();
        let mut swept = 0;

        for lesson_id in self.reconciler.tracked_lessons() {
            if cancel.is_cancelled() {
                break;
            }

            let schedule = match self.lookup(&lesson_id, cancel).await {
                Ok(Some(schedule)) => schedule,
                Ok(None) => {
                    warn!(lesson_id = %lesson_id, "Tracked lesson no longer scheduled, releasing");
                    self.release(&lesson_id);
                    continue;
                }
                Err(e) => {
                    warn!(lesson_id = %lesson_id, error = %e, "Schedule lookup failed during sweep");
                    continue;
                }
            };
            if !schedule.has_ended(now) {
                continue;
            }

            match self.reconciler.sweep(&schedule, now, cancel).await {
                Ok(count) => {
                    swept += count;
                    self.release(&lesson_id);
                }
                Err(e) => {
                    warn!(lesson_id = %lesson_id, error = %e, "Sweep failed, will retry");
                }
            }
        }

        if swept > 0 {
            info!(swept, "Ended lessons swept");
        }
        swept
    }

    fn ensure_running(&self, schedule: &LessonSchedule) -> Result<(), AppError> {
        if schedule.has_ended(self.clock.now()) {
            return Err(AppError::conflict(anyhow::anyhow!(
                "Lesson {} has already ended",
                schedule.lesson_id
            )));
        }
        Ok(())
    }

    fn release(&self, lesson_id: &LessonId) {
        self.registry.forget_lesson(lesson_id);
        self.reconciler.forget_lesson(lesson_id);
    }

    fn code_ttl(&self, requested: Option<std::time::Duration>) -> Result<Duration, AppError> {
        let Some(requested) = requested else {
            return Ok(self.registry.default_ttl());
        };
        Duration::from_std(requested)
            .ok()
            .filter(|ttl| *ttl > Duration::zero() && *ttl <= self.max_code_ttl)
            .ok_or_else(|| {
                AppError::input_invalid(anyhow::anyhow!(
                    "Code lifetime must be between 1 and {} seconds",
                    self.max_code_ttl.num_seconds()
                ))
            })
    }

    async fn lookup(
        &self,
        lesson_id: &LessonId,
        cancel: &CancellationToken,
    ) -> Result<Option<LessonSchedule>, AppError> {
        self.upstream
            .read("find_lesson", cancel, || self.schedules.find_lesson(lesson_id))
            .await
    }

    async fn schedule(
        &self,
        lesson_id: &LessonId,
        cancel: &CancellationToken,
    ) -> Result<LessonSchedule, AppError> {
        self.lookup(lesson_id, cancel).await?.ok_or_else(|| {
            AppError::not_found(anyhow::anyhow!("Lesson {} not found", lesson_id))
        })
    }

    /// Lesson schedule, provided the actor teaches it or is an admin.
    async fn staff_schedule(
        &self,
        lesson_id: &LessonId,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<LessonSchedule, AppError> {
        if !actor.role.can_run_lessons() {
            return Err(AppError::forbidden("Only teachers can manage lessons"));
        }

        let schedule = self.schedule(lesson_id, cancel).await?;
        if actor.is_admin() || schedule.is_taught_by(&actor.subject_id) {
            Ok(schedule)
        } else {
            Err(AppError::forbidden(format!(
                "Lesson {} is taught by another teacher",
                lesson_id
            )))
        }
    }
}
