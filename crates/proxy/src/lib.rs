pub mod config;
pub mod server;

pub use config::{ConfigError, DEFAULT_CONFIG_FILE, ProxyConfig};
pub use server::{AppState, router};
