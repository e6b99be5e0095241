use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::modules::{AuthenticationService, CheckInService};

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthenticationService>,
    pub check_in: Arc<CheckInService>,
    /// Cancelled on shutdown; every request works under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthenticationService>,
        check_in: Arc<CheckInService>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            auth,
            check_in,
            shutdown,
        }
    }

    /// Token for one request's collaborator calls.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
