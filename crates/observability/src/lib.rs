//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式，按 verbosity 选择级别)
//! - Prometheus 指标导出
//! - 采集指标记录与会话统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{AggregatingDiagnostics, LogFormat, ObservabilityConfig};
//!
//! // -v: debug 级别，Pretty 输出
//! observability::init_with_config(
//!     ObservabilityConfig::from_verbosity(1, false).with_format(LogFormat::Pretty),
//! )?;
//!
//! // 诊断事件汇总
//! let diagnostics = Arc::new(AggregatingDiagnostics::new());
//! let camera = DualCamera::new(config, sdk, consumer, diagnostics.clone());
//! // ...
//! println!("{}", diagnostics.summary());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_frame_delivered, record_missed_frame, record_overflow, record_poll_attempts,
    record_poll_timeout, record_session_finished, AggregatingDiagnostics, RunningStats,
    SessionStatsAggregator, SessionSummary, StatsSummary,
};

/// 可观测性配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// 未设置 RUST_LOG 时的日志级别
    pub log_level: String,
    /// 为 false 时忽略 RUST_LOG（`--quiet`）
    pub respect_env: bool,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::from_verbosity(0, false)
    }
}

impl ObservabilityConfig {
    /// 由命令行 `-v` 次数与 `--quiet` 推导日志级别
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let log_level = if quiet {
            "warn"
        } else {
            match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        Self {
            log_format: LogFormat::default(),
            log_level: log_level.to_string(),
            respect_env: !quiet,
            metrics_port: None,
        }
    }

    pub fn with_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.respect_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
        } else {
            EnvFilter::new(&self.log_level)
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    #[default]
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 初始化 Tracing，并按配置安装 Prometheus 导出器
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅初始化 Prometheus 指标（Tracing 已初始化的场景）
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_prometheus(port)
}

fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
