//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, AuthConfig, ConfigError, DispatcherSettings, Environment,
    RouterSettings, ServerConfig,
};
