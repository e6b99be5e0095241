//! Request extractors shared by the feature modules.
//!
//! - [`auth`]: bearer token authentication
//!
//! # Authentication Flow
//!
//! 1. Client sends `Authorization: Bearer <token>`
//! 2. [`auth::AuthUser`] hands the token to the authentication service
//! 3. The resolved [`rollcall_models::Actor`] reaches the handler
//! 4. Role and lesson ownership are checked by the services, not here

pub mod auth;
