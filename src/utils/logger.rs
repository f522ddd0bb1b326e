use crate::utils::error::{Result, WatcherError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sawdust_watcher=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sawdust_watcher=info"))
    }
}

/// 日誌檔名，以啟動時間命名
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}.log", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// 初始化監控程式的日誌：終端機輸出，加上可選的日誌檔
///
/// 回傳日誌檔的完整路徑（若有）。
pub fn init_watcher_logger(
    verbose: bool,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let stderr_layer = match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .json()
            .boxed(),
    };

    let mut log_path = None;
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_name = log_file_name(chrono::Local::now());
            log_path = Some(dir.join(&file_name));
            let appender = tracing_appender::rolling::never(dir, file_name);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(false)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| WatcherError::ConfigError {
            message: format!("Failed to initialise logging: {}", e),
        })?;

    Ok(log_path)
}

/// 離線工具用的精簡日誌
pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
