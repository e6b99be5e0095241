pub mod controller;
pub mod reconciler;
pub mod router;

pub use reconciler::{AttendanceReconciler, Transition, TransitionOutcome};
pub use router::init_attendance_router;
