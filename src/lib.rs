pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{LocalStorage, OpenAiClient};
pub use config::AuditConfig;
pub use core::audit::{AuditEngine, AuditResponse};
pub use server::{create_router, serve, AppState};
pub use utils::error::{AuditError, Result};
