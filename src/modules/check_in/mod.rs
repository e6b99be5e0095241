pub mod controller;
pub mod router;
pub mod service;

pub use router::init_check_in_router;
pub use service::CheckInService;
