pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::storage::LocalStorage;
pub use config::WatcherConfig;
pub use crate::core::{alarm::Alarm, pipeline::CameraPipeline, watcher::WatcherEngine};
pub use utils::error::{Result, WatcherError};
