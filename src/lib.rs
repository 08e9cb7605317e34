// NSP Token Manager - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod schedule;
pub mod store;

pub use auth::{TokenLifecycleManager, ValidToken};
pub use error::{Error, Result};
