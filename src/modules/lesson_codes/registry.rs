//! Lifecycle of per-lesson attendance codes.
//!
//! Each `(lesson, kind)` pair owns a slot behind its own mutex; start, rotate
//! and validate on one slot are serialized, while slots of different lessons
//! never wait on each other. The outer map lock is held only long enough to
//! find or create a slot.
//!
//! A slot moves through `NoActiveCode -> Active -> (Expired | Rotated)`.
//! Rotation retires the current code and issues the next one inside the same
//! critical section, so no caller ever observes two active codes.
//!
//! Lock order is slot, then the active-value index. The index is never held
//! while acquiring a slot.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info};

use rollcall_config::AttendanceConfig;
use rollcall_core::{AppError, SharedClock};
use rollcall_models::{CodeKind, LessonCode, LessonId, SubjectId, ValidationOutcome};

use crate::metrics::{track_code_issued, track_code_validation};

/// Attempts at drawing a value that is unique among active codes.
const MAX_DRAW_ATTEMPTS: usize = 32;

type SlotKey = (LessonId, CodeKind);

#[derive(Debug, Default)]
struct CodeSlot {
    /// Latest issued code; may already be past its expiry.
    active: Option<LessonCode>,
    /// Code most recently superseded by rotation or restart.
    retired: Option<LessonCode>,
}

#[derive(Debug, Clone)]
struct ActiveEntry {
    lesson_id: LessonId,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LessonCodeRegistry {
    clock: SharedClock,
    default_ttl: Duration,
    pincode_digits: u32,
    qr_token_length: usize,
    slots: Mutex<HashMap<SlotKey, Arc<Mutex<CodeSlot>>>>,
    active_values: Mutex<HashMap<(CodeKind, String), ActiveEntry>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn same_value(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

impl LessonCodeRegistry {
    pub fn new(config: &AttendanceConfig, clock: SharedClock) -> Self {
        let config = config.clone().normalized();
        Self {
            clock,
            default_ttl: Duration::from_std(config.default_code_ttl)
                .unwrap_or_else(|_| Duration::minutes(10)),
            pincode_digits: config.pincode_digits,
            qr_token_length: config.qr_token_length,
            slots: Mutex::new(HashMap::new()),
            active_values: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issues a fresh code. Fails with a conflict while an unexpired code exists.
    pub fn start(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        ttl: Duration,
    ) -> Result<LessonCode, AppError> {
        if ttl <= Duration::zero() {
            return Err(AppError::input_invalid(anyhow::anyhow!(
                "Code lifetime must be positive"
            )));
        }

        let slot = self.slot(lesson_id, kind);
        let mut slot = lock(&slot);
        let now = self.clock.now();

        if let Some(active) = slot.active.as_ref().filter(|c| c.is_active_at(now)) {
            return Err(AppError::conflict(anyhow::anyhow!(
                "An active {} code already exists for lesson {} until {}",
                kind,
                lesson_id,
                active.expires_at
            )));
        }

        self.retire(&mut slot);
        let code = self.issue(&mut slot, lesson_id, kind, ttl, now)?;
        track_code_issued(kind, false);
        info!(lesson_id = %lesson_id, kind = %kind, expires_at = %code.expires_at, "Lesson code started");
        Ok(code)
    }

    /// Retires the current code, expired or not, and issues its replacement
    /// with the same lifetime.
    pub fn rotate(&self, lesson_id: &LessonId, kind: CodeKind) -> Result<LessonCode, AppError> {
        let slot = self.slot(lesson_id, kind);
        let mut slot = lock(&slot);
        let now = self.clock.now();

        let ttl = slot
            .active
            .as_ref()
            .map(LessonCode::ttl)
            .filter(|ttl| *ttl > Duration::zero())
            .unwrap_or(self.default_ttl);

        self.retire(&mut slot);
        let code = self.issue(&mut slot, lesson_id, kind, ttl, now)?;
        track_code_issued(kind, true);
        info!(lesson_id = %lesson_id, kind = %kind, expires_at = %code.expires_at, "Lesson code rotated");
        Ok(code)
    }

    /// Checks a presented value and records the subject on acceptance.
    ///
    /// Repeating an accepted value while the code is still active is accepted
    /// again; the subject is recorded once.
    pub fn validate(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        presented: &str,
        subject_id: &SubjectId,
    ) -> Result<ValidationOutcome, AppError> {
        let Some(slot) = self.existing_slot(lesson_id, kind) else {
            return Ok(self.observe(lesson_id, kind, subject_id, ValidationOutcome::Expired));
        };
        let mut slot = lock(&slot);
        let outcome = self.evaluate(&slot, presented, self.clock.now())?;
        if outcome == ValidationOutcome::Accepted {
            if let Some(active) = slot.active.as_mut() {
                active.consumed_by.insert(subject_id.clone());
            }
        }
        Ok(self.observe(lesson_id, kind, subject_id, outcome))
    }

    /// Like [`validate`](Self::validate) but leaves `consumed_by` untouched.
    ///
    /// Callers that apply further state on acceptance record the subject with
    /// [`commit`](Self::commit) once that state is in place.
    pub fn check(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        presented: &str,
        subject_id: &SubjectId,
    ) -> Result<ValidationOutcome, AppError> {
        let Some(slot) = self.existing_slot(lesson_id, kind) else {
            return Ok(self.observe(lesson_id, kind, subject_id, ValidationOutcome::Expired));
        };
        let slot = lock(&slot);
        let outcome = self.evaluate(&slot, presented, self.clock.now())?;
        Ok(self.observe(lesson_id, kind, subject_id, outcome))
    }

    /// Records a subject on the code carrying `presented`, whether it is still
    /// the slot's current code or was retired after the check. Returns false
    /// when neither code carries the value any more.
    pub fn commit(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        presented: &str,
        subject_id: &SubjectId,
    ) -> bool {
        let Some(slot) = self.existing_slot(lesson_id, kind) else {
            return false;
        };
        let mut slot = lock(&slot);
        let CodeSlot { active, retired } = &mut *slot;
        let holder = [active.as_mut(), retired.as_mut()]
            .into_iter()
            .flatten()
            .find(|c| same_value(&c.code_value, presented));

        match holder {
            Some(code) => {
                code.consumed_by.insert(subject_id.clone());
                true
            }
            None => {
                debug!(lesson_id = %lesson_id, kind = %kind, subject_id = %subject_id, "Checked code gone before commit");
                false
            }
        }
    }

    fn observe(
        &self,
        lesson_id: &LessonId,
        kind: CodeKind,
        subject_id: &SubjectId,
        outcome: ValidationOutcome,
    ) -> ValidationOutcome {
        track_code_validation(kind, outcome);
        debug!(lesson_id = %lesson_id, kind = %kind, subject_id = %subject_id, outcome = %outcome, "Lesson code validated");
        outcome
    }

    /// A retired value is expired for everyone, including subjects that
    /// consumed it.
    fn evaluate(
        &self,
        slot: &CodeSlot,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidationOutcome, AppError> {
        if slot
            .retired
            .as_ref()
            .is_some_and(|c| same_value(&c.code_value, presented))
        {
            return Ok(ValidationOutcome::Expired);
        }

        let Some(active) = slot.active.as_ref() else {
            return Ok(ValidationOutcome::Expired);
        };
        if !active.is_active_at(now) {
            return Ok(ValidationOutcome::Expired);
        }
        if !same_value(&active.code_value, presented) {
            return Ok(ValidationOutcome::WrongValue);
        }

        self.assert_sole_owner(active, now)?;
        Ok(ValidationOutcome::Accepted)
    }

    /// Snapshot of the slot's current code, if it is still active.
    pub fn active_code(&self, lesson_id: &LessonId, kind: CodeKind) -> Option<LessonCode> {
        let slot = self.existing_slot(lesson_id, kind)?;
        let slot = lock(&slot);
        let now = self.clock.now();
        slot.active.as_ref().filter(|c| c.is_active_at(now)).cloned()
    }

    /// Drops every slot of a lesson, e.g. once it has been swept.
    pub fn forget_lesson(&self, lesson_id: &LessonId) {
        let removed: Vec<_> = {
            let mut slots = lock(&self.slots);
            CodeKind::ALL
                .iter()
                .filter_map(|kind| slots.remove(&(lesson_id.clone(), *kind)))
                .collect()
        };

        for slot in removed {
            let mut slot = lock(&slot);
            self.retire(&mut slot);
        }
        debug!(lesson_id = %lesson_id, "Lesson codes forgotten");
    }

    fn slot(&self, lesson_id: &LessonId, kind: CodeKind) -> Arc<Mutex<CodeSlot>> {
        lock(&self.slots)
            .entry((lesson_id.clone(), kind))
            .or_default()
            .clone()
    }

    fn existing_slot(&self, lesson_id: &LessonId, kind: CodeKind) -> Option<Arc<Mutex<CodeSlot>>> {
        lock(&self.slots).get(&(lesson_id.clone(), kind)).cloned()
    }

    /// Moves the slot's code to `retired` and releases its value.
    fn retire(&self, slot: &mut CodeSlot) {
        if let Some(code) = slot.active.take() {
            let mut index = lock(&self.active_values);
            let key = (code.kind, code.code_value.clone());
            if index
                .get(&key)
                .is_some_and(|entry| entry.lesson_id == code.lesson_id)
            {
                index.remove(&key);
            }
            slot.retired = Some(code);
        }
    }

    fn issue(
        &self,
        slot: &mut CodeSlot,
        lesson_id: &LessonId,
        kind: CodeKind,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<LessonCode, AppError> {
        let expires_at = now + ttl;
        let previous = slot.retired.as_ref().map(|c| c.code_value.as_str());

        let mut index = lock(&self.active_values);
        index.retain(|_, entry| entry.expires_at > now);

        for _ in 0..MAX_DRAW_ATTEMPTS {
            let value = self.draw(kind);
            if previous.is_some_and(|p| same_value(p, &value)) {
                continue;
            }
            let key = (kind, value);
            if index.contains_key(&key) {
                continue;
            }

            index.insert(
                key.clone(),
                ActiveEntry {
                    lesson_id: lesson_id.clone(),
                    expires_at,
                },
            );
            let code = LessonCode {
                lesson_id: lesson_id.clone(),
                code_value: key.1,
                kind,
                issued_at: now,
                expires_at,
                consumed_by: BTreeSet::new(),
            };
            slot.active = Some(code.clone());
            return Ok(code);
        }

        Err(AppError::internal(anyhow::anyhow!(
            "Could not draw a unique {} code for lesson {}",
            kind,
            lesson_id
        )))
    }

    fn draw(&self, kind: CodeKind) -> String {
        let mut rng = rand::thread_rng();
        match kind {
            CodeKind::Pincode => {
                let upper = 10u64.pow(self.pincode_digits);
                format!(
                    "{:0width$}",
                    rng.gen_range(0..upper),
                    width = self.pincode_digits as usize
                )
            }
            CodeKind::QrToken => (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(self.qr_token_length)
                .map(char::from)
                .collect(),
        }
    }

    /// The active-value index must attribute an accepted value to this lesson.
    fn assert_sole_owner(&self, code: &LessonCode, now: DateTime<Utc>) -> Result<(), AppError> {
        let index = lock(&self.active_values);
        match index.get(&(code.kind, code.code_value.clone())) {
            Some(entry) if entry.lesson_id == code.lesson_id => Ok(()),
            other => {
                let owner = other.map(|entry| entry.lesson_id.to_string());
                error!(
                    lesson_id = %code.lesson_id,
                    kind = %code.kind,
                    issued_at = %code.issued_at,
                    expires_at = %code.expires_at,
                    observed_at = %now,
                    indexed_owner = ?owner,
                    "Active code is not exclusively owned by its lesson"
                );
                Err(AppError::internal(anyhow::anyhow!(
                    "Inconsistent active {} code state for lesson {}",
                    code.kind,
                    code.lesson_id
                )))
            }
        }
    }
}
