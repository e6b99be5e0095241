//! Lesson schedules, attendance codes and check-in DTOs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::attendance::AttendanceRecord;
use crate::ids::{LessonId, SubjectId};
use crate::users::UnknownVariant;

/// Schedule of a lesson as reported by the scheduling system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSchedule {
    pub lesson_id: LessonId,
    pub teacher_id: SubjectId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub roster: HashSet<SubjectId>,
}

impl LessonSchedule {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn is_on_roster(&self, subject_id: &SubjectId) -> bool {
        self.roster.contains(subject_id)
    }

    pub fn is_taught_by(&self, subject_id: &SubjectId) -> bool {
        &self.teacher_id == subject_id
    }
}

/// The two kinds of attendance code a lesson can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// Short numeric code read out in the room.
    Pincode,
    /// Opaque token delivered through a scannable code.
    QrToken,
}

impl CodeKind {
    pub const ALL: [CodeKind; 2] = [CodeKind::Pincode, CodeKind::QrToken];

    pub fn as_str(self) -> &'static str {
        match self {
            CodeKind::Pincode => "pincode",
            CodeKind::QrToken => "qr_token",
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pincode" => Ok(CodeKind::Pincode),
            "qr_token" => Ok(CodeKind::QrToken),
            _ => Err(UnknownVariant {
                kind: "code kind",
                value: s.to_string(),
            }),
        }
    }
}

/// A generated attendance code. Superseded, never mutated, on rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCode {
    pub lesson_id: LessonId,
    pub code_value: String,
    pub kind: CodeKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_by: BTreeSet<SubjectId>,
}

impl LessonCode {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn ttl(&self) -> Duration {
        self.expires_at - self.issued_at
    }
}

/// Result of presenting a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Accepted,
    Expired,
    WrongValue,
    /// Reserved for clients of the wire format. The registry reports a
    /// retired value as `Expired`, whoever presents it.
    AlreadyConsumed,
}

impl ValidationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationOutcome::Accepted => "accepted",
            ValidationOutcome::Expired => "expired",
            ValidationOutcome::WrongValue => "wrong_value",
            ValidationOutcome::AlreadyConsumed => "already_consumed",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start a code for a lesson. Without `ttl_seconds` the configured default applies.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartLessonCodeDto {
    pub kind: CodeKind,
    #[validate(range(min = 1))]
    pub ttl_seconds: Option<u64>,
}

/// A student presenting a code.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitCodeDto {
    pub kind: CodeKind,
    #[validate(length(min = 1, max = 128))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub outcome: ValidationOutcome,
    pub record: Option<AttendanceRecord>,
}
