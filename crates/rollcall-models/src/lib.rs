//! # Rollcall Models
//!
//! Domain models and DTOs for the Rollcall API.
//!
//! # Modules
//!
//! - [`ids`]: String-backed identifiers for subjects and lessons
//! - [`users`]: Credentials and roles
//! - [`auth`]: Login and registration DTOs
//! - [`lessons`]: Lesson schedules, attendance codes and check-in DTOs
//! - [`attendance`]: Attendance records and override DTOs
//!
//! # Example
//!
//! ```ignore
//! use rollcall_models::{CodeKind, LessonId, ValidationOutcome};
//!
//! let lesson: LessonId = "math-101".parse()?;
//! let kind: CodeKind = "pincode".parse()?;
//! ```

pub mod attendance;
pub mod auth;
pub mod ids;
pub mod lessons;
pub mod users;

pub use attendance::{AttendanceRecord, AttendanceSource, AttendanceStatus, OverrideAttendanceDto};
pub use auth::{LoginRequest, LoginResponse, RegisterRequest, RegisteredUser};
pub use ids::{IdError, LessonId, SubjectId};
pub use lessons::{
    CheckInResponse, CodeKind, LessonCode, LessonSchedule, StartLessonCodeDto, SubmitCodeDto,
    ValidationOutcome,
};
pub use users::{Actor, Credential, Role, UnknownVariant};
