//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image sources.
pub mod image;
/// Durable store adapters.
pub mod storage;

pub use config::{AppConfig, CliArgs, Command, LogLevel, StorageManager};
pub use image::{HttpImageSource, HttpSourceConfig};
pub use storage::{FileStore, MemoryStore};
