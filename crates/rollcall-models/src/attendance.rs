//! Attendance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::ids::{LessonId, SubjectId};
use crate::users::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Pending,
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttendanceStatus::Pending),
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            _ => Err(UnknownVariant {
                kind: "attendance status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceSource {
    Auto,
    /// Set by a teacher; automatic transitions no longer change the status.
    ManualOverride,
}

impl AttendanceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceSource::Auto => "auto",
            AttendanceSource::ManualOverride => "manual_override",
        }
    }
}

impl fmt::Display for AttendanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(AttendanceSource::Auto),
            "manual_override" => Ok(AttendanceSource::ManualOverride),
            _ => Err(UnknownVariant {
                kind: "attendance source",
                value: s.to_string(),
            }),
        }
    }
}

/// One record per (lesson, subject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub lesson_id: LessonId,
    pub subject_id: SubjectId,
    pub status: AttendanceStatus,
    pub source: AttendanceSource,
    /// When the current status was set.
    pub decided_at: DateTime<Utc>,
    /// Override actor, only set for `ManualOverride`.
    pub decided_by: Option<SubjectId>,
    /// Latest accepted code, kept even when it did not change the status.
    pub last_auto_check_in: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub fn pending(lesson_id: LessonId, subject_id: SubjectId, at: DateTime<Utc>) -> Self {
        Self {
            lesson_id,
            subject_id,
            status: AttendanceStatus::Pending,
            source: AttendanceSource::Auto,
            decided_at: at,
            decided_by: None,
            last_auto_check_in: None,
        }
    }

    pub fn is_overridden(&self) -> bool {
        self.source == AttendanceSource::ManualOverride
    }
}

/// Teacher decision for one subject. `pending` is rejected by the service.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OverrideAttendanceDto {
    pub status: AttendanceStatus,
}
