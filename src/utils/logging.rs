//! # 日志初始化
//!
//! 用 `env_logger` 安装 `log` 后端。设置了 `RUST_LOG` 时以其为准，
//! 否则只为本 crate 打开指定级别。可选把日志写入文件而非 stderr。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `log`, `env_logger`

use crate::error::{PicometerError, Result};

use clap::ValueEnum;
use std::fs::File;
use std::path::Path;

/// 命令行可选的日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// `crate=level` 形式的默认过滤串
fn filter_string(level: log::LevelFilter) -> String {
    format!(
        "{}={}",
        env!("CARGO_PKG_NAME"),
        level.to_string().to_lowercase()
    )
}

/// 初始化日志；重复调用时保持第一次的配置
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<()> {
    let mut builder = if std::env::var("RUST_LOG").is_err() {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(filter_string(level.into())),
        )
    } else {
        env_logger::Builder::from_default_env()
    };

    if let Some(path) = log_file {
        let file = File::create(path).map_err(|e| PicometerError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
    }

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_string() {
        assert_eq!(filter_string(LogLevel::Warn.into()), "picometer=warn");
        assert_eq!(filter_string(LogLevel::Off.into()), "picometer=off");
    }
}
