//! 日志初始化
//!
//! 包装 `tracing-subscriber` 的 fmt 订阅者。配置可以来自代码、
//! 环境变量（`RUST_LOG` / `LOG_LEVEL` / `LOG_FORMAT`）或 `[logging]` 配置段。

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigLoader;
use crate::error::{ContainerError, ContainerResult};

/// `[logging]` 配置段名
pub const LOGGING_SECTION: &str = "logging";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "warning" {
            return Ok(LogLevel::Warn);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| ContainerError::Configuration(format!("Invalid log level: {}", s)))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 紧凑格式（默认）
    #[default]
    Compact,
    /// 完整格式
    Full,
    Json,
    /// 多行美化格式，适合开发
    Pretty,
}

impl LogFormat {
    const ALL: [LogFormat; 4] = [
        LogFormat::Compact,
        LogFormat::Full,
        LogFormat::Json,
        LogFormat::Pretty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        LogFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == lower)
            .ok_or_else(|| ContainerError::Configuration(format!("Invalid log format: {}", s)))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志配置
///
/// 可以直接从 `[logging]` 配置段绑定：
///
/// ```toml
/// [logging]
/// level = "debug"
/// format = "json"
/// filter = "trellis_aop=trace"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// 是否输出模块路径
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_thread_names: bool,
    /// `EnvFilter` 指令，例如 `trellis_aop=debug,my_app=trace`；设置后优先于 `level`
    pub filter: Option<String>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// 同时开关线程 ID 与线程名
    pub fn show_threads(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self.show_thread_names = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取：`RUST_LOG` 作为过滤器，`LOG_LEVEL` / `LOG_FORMAT` 无法解析时忽略
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = Self::default();
        config.filter = env("RUST_LOG");
        if let Some(level) = env("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = env("LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        config
    }

    /// 绑定 `[logging]` 配置段（含环境变量覆盖）
    pub fn load(loader: &ConfigLoader) -> ContainerResult<Self> {
        loader.section(LOGGING_SECTION)
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            // 优先使用 RUST_LOG 环境变量，否则使用配置的级别
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    /// 初始化日志系统
    ///
    /// 全局订阅者只能设置一次，重复调用返回 `LoggingInitFailed`
    pub fn init(self) -> ContainerResult<()> {
        let env_filter = self.env_filter();
        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };

        result.map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))
    }
}
