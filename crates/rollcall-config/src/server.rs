use std::env;

pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            addr: env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string()),
        }
    }
}
