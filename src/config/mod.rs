#[cfg(feature = "cli")]
pub mod cli;
pub mod taxonomy;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use taxonomy::{Taxonomy, TaxonomyRegistry, CATCH_ALL, DEFAULT_INDUSTRY};
pub use toml_config::AuditConfig;
