pub mod attendance;
pub mod auth;
pub mod check_in;
pub mod lesson_codes;

use rollcall_core::AppError;
use rollcall_models::{CodeKind, LessonId, SubjectId};

pub use self::attendance::AttendanceReconciler;
pub use self::auth::AuthenticationService;
pub use self::check_in::CheckInService;
pub use self::lesson_codes::LessonCodeRegistry;

// Path segments are parsed here so malformed ids surface as `AppError` JSON.

pub(crate) fn lesson_id_param(raw: String) -> Result<LessonId, AppError> {
    LessonId::parse(raw).map_err(AppError::input_invalid)
}

pub(crate) fn subject_id_param(raw: String) -> Result<SubjectId, AppError> {
    SubjectId::parse(raw).map_err(AppError::input_invalid)
}

pub(crate) fn code_kind_param(raw: &str) -> Result<CodeKind, AppError> {
    raw.parse().map_err(AppError::input_invalid)
}
