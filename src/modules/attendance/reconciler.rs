//! Attendance status state machine.
//!
//! ```text
//! Pending --accepted before end--> Present | Late
//! Pending --sweep after end------> Absent
//! any     --manual override------> Present | Absent | Late (source = ManualOverride)
//! ```
//!
//! Every `(lesson, subject)` record sits behind its own async mutex. A
//! transition reads the record, computes the next one, persists it and only
//! then commits it in memory, all while holding that mutex. A failed or
//! cancelled write leaves the record exactly as it was.
//!
//! Manual overrides win regardless of arrival order: an automatic transition
//! checks the source inside the same critical section and leaves an
//! overridden status alone.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use rollcall_config::AttendanceConfig;
use rollcall_core::{AppError, SharedClock};
use rollcall_models::{
    AttendanceRecord, AttendanceSource, AttendanceStatus, LessonId, LessonSchedule, SubjectId,
};

use crate::collaborators::{AttendancePersistPtr, UpstreamPolicy};
use crate::metrics::track_attendance_transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed.
    Applied,
    /// Nothing to do, e.g. the subject was already marked.
    Unchanged,
    /// Overridden record; the check-in was noted but the status kept.
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub outcome: TransitionOutcome,
    pub record: AttendanceRecord,
}

type RecordCell = Arc<tokio::sync::Mutex<Option<AttendanceRecord>>>;

#[derive(Default)]
struct LessonAttendance {
    hydrated: OnceCell<()>,
    records: Mutex<HashMap<SubjectId, RecordCell>>,
}

impl LessonAttendance {
    fn cell(&self, subject_id: &SubjectId) -> RecordCell {
        lock(&self.records)
            .entry(subject_id.clone())
            .or_default()
            .clone()
    }

    fn cells(&self) -> Vec<(SubjectId, RecordCell)> {
        lock(&self.records)
            .iter()
            .map(|(subject, cell)| (subject.clone(), cell.clone()))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct AttendanceReconciler {
    persist: AttendancePersistPtr,
    upstream: UpstreamPolicy,
    grace_window: Duration,
    clock: SharedClock,
    lessons: Mutex<HashMap<LessonId, Arc<LessonAttendance>>>,
}

impl std::fmt::Debug for AttendanceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceReconciler")
            .field("grace_window", &self.grace_window)
            .field("tracked_lessons", &lock(&self.lessons).len())
            .finish_non_exhaustive()
    }
}

impl AttendanceReconciler {
    pub fn new(
        persist: AttendancePersistPtr,
        upstream: UpstreamPolicy,
        config: &AttendanceConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            persist,
            upstream,
            grace_window: Duration::from_std(config.grace_window)
                .unwrap_or_else(|_| Duration::minutes(5)),
            clock,
            lessons: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a Pending record for every roster member without one.
    pub async fn open_lesson(
        &self,
        schedule: &LessonSchedule,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let lesson = self.hydrated(&schedule.lesson_id, cancel).await?;
        let now = self.clock.now();

        for subject_id in &schedule.roster {
            let cell = lesson.cell(subject_id);
            let mut slot = cell.lock().await;
            if slot.is_none() {
                *slot = Some(AttendanceRecord::pending(
                    schedule.lesson_id.clone(),
                    subject_id.clone(),
                    now,
                ));
            }
        }
        Ok(())
    }

    /// Applies an accepted code: Present within the grace window, Late after it.
    #[instrument(skip(self, schedule, cancel), fields(lesson_id = %schedule.lesson_id))]
    pub async fn on_code_accepted(
        &self,
        schedule: &LessonSchedule,
        subject_id: &SubjectId,
        accepted_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Transition, AppError> {
        let lesson = self.hydrated(&schedule.lesson_id, cancel).await?;
        let cell = lesson.cell(subject_id);
        let mut slot = cell.lock().await;

        let current = slot.clone().unwrap_or_else(|| {
            AttendanceRecord::pending(schedule.lesson_id.clone(), subject_id.clone(), accepted_at)
        });

        let (outcome, next) = if current.is_overridden() {
            let mut next = current.clone();
            next.last_auto_check_in = Some(accepted_at);
            (TransitionOutcome::Frozen, next)
        } else if current.status != AttendanceStatus::Pending
            || schedule.has_ended(accepted_at)
        {
            (TransitionOutcome::Unchanged, current.clone())
        } else {
            let status = if accepted_at > schedule.start_time + self.grace_window {
                AttendanceStatus::Late
            } else {
                AttendanceStatus::Present
            };
            let next = AttendanceRecord {
                status,
                source: AttendanceSource::Auto,
                decided_at: accepted_at,
                decided_by: None,
                last_auto_check_in: Some(accepted_at),
                ..current.clone()
            };
            (TransitionOutcome::Applied, next)
        };

        if next != current {
            self.persist(&next, cancel).await?;
        }
        *slot = Some(next.clone());

        if outcome == TransitionOutcome::Applied {
            track_attendance_transition(next.status, next.source);
            info!(subject_id = %subject_id, status = %next.status, "Attendance recorded");
        } else {
            debug!(subject_id = %subject_id, outcome = ?outcome, "Check-in did not change attendance");
        }

        Ok(Transition {
            outcome,
            record: next,
        })
    }

    /// Teacher decision. Freezes the record against automatic transitions.
    #[instrument(skip(self, schedule, cancel), fields(lesson_id = %schedule.lesson_id))]
    pub async fn on_manual_override(
        &self,
        schedule: &LessonSchedule,
        subject_id: &SubjectId,
        status: AttendanceStatus,
        actor_id: &SubjectId,
        cancel: &CancellationToken,
    ) -> Result<Transition, AppError> {
        if status == AttendanceStatus::Pending {
            return Err(AppError::input_invalid(anyhow::anyhow!(
                "Attendance cannot be overridden to pending"
            )));
        }
        if !schedule.is_on_roster(subject_id) {
            return Err(AppError::not_found(anyhow::anyhow!(
                "Subject {} is not on the roster of lesson {}",
                subject_id,
                schedule.lesson_id
            )));
        }

        let lesson = self.hydrated(&schedule.lesson_id, cancel).await?;
        let cell = lesson.cell(subject_id);
        let mut slot = cell.lock().await;
        let now = self.clock.now();

        let current = slot.clone().unwrap_or_else(|| {
            AttendanceRecord::pending(schedule.lesson_id.clone(), subject_id.clone(), now)
        });
        let next = AttendanceRecord {
            status,
            source: AttendanceSource::ManualOverride,
            decided_at: now,
            decided_by: Some(actor_id.clone()),
            ..current
        };

        self.persist(&next, cancel).await?;
        *slot = Some(next.clone());

        track_attendance_transition(next.status, next.source);
        info!(subject_id = %subject_id, actor_id = %actor_id, status = %status, "Attendance overridden");

        Ok(Transition {
            outcome: TransitionOutcome::Applied,
            record: next,
        })
    }

    /// Resolves every still-Pending record of an ended lesson to Absent.
    ///
    /// Returns how many records changed; a second sweep returns zero.
    #[instrument(skip(self, schedule, cancel), fields(lesson_id = %schedule.lesson_id))]
    pub async fn sweep(
        &self,
        schedule: &LessonSchedule,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<usize, AppError> {
        if !schedule.has_ended(now) {
            return Ok(0);
        }

        let lesson = self.hydrated(&schedule.lesson_id, cancel).await?;
        for subject_id in &schedule.roster {
            lesson.cell(subject_id);
        }

        let mut swept = 0;
        for (subject_id, cell) in lesson.cells() {
            let mut slot = cell.lock().await;
            let current = slot.clone().unwrap_or_else(|| {
                AttendanceRecord::pending(schedule.lesson_id.clone(), subject_id.clone(), now)
            });
            if current.status != AttendanceStatus::Pending || current.is_overridden() {
                continue;
            }

            let next = AttendanceRecord {
                status: AttendanceStatus::Absent,
                decided_at: now,
                ..current
            };
            self.persist(&next, cancel).await?;
            *slot = Some(next.clone());
            track_attendance_transition(next.status, next.source);
            swept += 1;
        }

        if swept > 0 {
            info!(swept, "Lesson swept");
        }
        Ok(swept)
    }

    /// Every record of a lesson, roster members without one shown as Pending.
    pub async fn lesson_attendance(
        &self,
        schedule: &LessonSchedule,
        cancel: &CancellationToken,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let lesson = self.hydrated(&schedule.lesson_id, cancel).await?;

        let mut records = BTreeMap::new();
        for (subject_id, cell) in lesson.cells() {
            if let Some(record) = cell.lock().await.clone() {
                records.insert(subject_id, record);
            }
        }
        for subject_id in &schedule.roster {
            records.entry(subject_id.clone()).or_insert_with(|| {
                AttendanceRecord::pending(
                    schedule.lesson_id.clone(),
                    subject_id.clone(),
                    schedule.start_time,
                )
            });
        }

        Ok(records.into_values().collect())
    }

    pub fn tracked_lessons(&self) -> Vec<LessonId> {
        lock(&self.lessons).keys().cloned().collect()
    }

    /// Drops in-memory state of a lesson; persisted records are untouched.
    pub fn forget_lesson(&self, lesson_id: &LessonId) {
        lock(&self.lessons).remove(lesson_id);
    }

    /// Lesson state, loaded from persistence on first use.
    async fn hydrated(
        &self,
        lesson_id: &LessonId,
        cancel: &CancellationToken,
    ) -> Result<Arc<LessonAttendance>, AppError> {
        let lesson = lock(&self.lessons)
            .entry(lesson_id.clone())
            .or_default()
            .clone();

        lesson
            .hydrated
            .get_or_try_init(|| async {
                let loaded = self
                    .upstream
                    .read("load_attendance", cancel, || self.persist.load(lesson_id))
                    .await?;

                let mut records = lock(&lesson.records);
                for record in loaded {
                    records
                        .entry(record.subject_id.clone())
                        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Some(record))));
                }
                Ok::<(), AppError>(())
            })
            .await?;

        Ok(lesson)
    }

    async fn persist(
        &self,
        record: &AttendanceRecord,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        self.upstream
            .write("persist_attendance", cancel, self.persist.persist(record))
            .await
    }
}
