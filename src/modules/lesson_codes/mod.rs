pub mod controller;
pub mod registry;
pub mod router;

pub use registry::LessonCodeRegistry;
pub use router::init_lesson_codes_router;
