//! GitHub Actions workflow language server
//! Provides LSP completion and hover for `.github/workflows` YAML files

pub mod action;
pub mod cache;
pub mod clock;
pub mod completion;
pub mod config;
mod diagnostics;
pub mod error;
pub mod fetch;
pub mod hover;
pub mod parser;
pub mod schema;
mod server;
pub mod suggestion;

// Re-export the types needed to run the server
pub use config::Config;
pub use server::Backend;
