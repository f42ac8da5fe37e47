//! 采集指标收集模块
//!
//! 记录轮询、对齐、投递与会话级别的运行指标。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use contracts::{DiagnosticEvent, DiagnosticSink};
use metrics::{counter, gauge, histogram};

/// 记录一次成功轮询所用的尝试次数
pub fn record_poll_attempts(channel: &str, attempts: u32) {
    histogram!(
        "dualcam_poll_attempts",
        "channel" => channel.to_string()
    )
    .record(attempts as f64);
}

/// 记录轮询超时
pub fn record_poll_timeout(channel: &str) {
    counter!(
        "dualcam_poll_timeouts_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录帧 ID 不连续
pub fn record_missed_frame(channel: &str) {
    counter!(
        "dualcam_missed_frames_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录一帧成功投递给消费者
pub fn record_frame_delivered(channel: &str) {
    counter!(
        "dualcam_frames_delivered_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录消费者缓冲溢出
pub fn record_overflow(channel: &str) {
    counter!(
        "dualcam_buffer_overflows_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录实时采集会话结束
pub fn record_session_finished(frames: u64, overflows: u64, ok: bool) {
    let status = if ok { "success" } else { "failure" };
    counter!("dualcam_sessions_total", "status" => status.to_string()).increment(1);
    gauge!("dualcam_last_session_frames").set(frames as f64);
    gauge!("dualcam_last_session_overflows").set(overflows as f64);
}

/// 会话统计聚合器
///
/// 在内存中聚合诊断事件，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SessionStatsAggregator {
    /// 投递帧数
    pub frames_delivered: u64,

    /// 溢出次数
    pub overflow_events: u64,

    /// 轮询超时次数
    pub poll_timeouts: u64,

    /// 被拒绝的投递
    pub rejected_deliveries: u64,

    /// SDK 错误日志条数
    pub sdk_errors: u64,

    /// 帧 ID 跳变幅度统计
    pub gap_stats: RunningStats,

    /// 各通道丢帧次数
    pub missed_counts: HashMap<String, u64>,
}

impl SessionStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据诊断事件更新统计
    pub fn observe(&mut self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::MissedFrame {
                channel,
                expected,
                actual,
                ..
            } => {
                *self
                    .missed_counts
                    .entry(channel.name().to_string())
                    .or_insert(0) += 1;
                self.gap_stats.push(actual.abs_diff(*expected) as f64);
            }
            DiagnosticEvent::BufferOverflow { .. } => self.overflow_events += 1,
            DiagnosticEvent::PollTimeout { .. } => self.poll_timeouts += 1,
            DiagnosticEvent::DeliveryRejected { .. } => self.rejected_deliveries += 1,
            DiagnosticEvent::Sdk(record) => {
                if record.is_error {
                    self.sdk_errors += 1;
                }
            }
        }
    }

    /// 累加投递帧数
    pub fn add_delivered(&mut self, frames: u64) {
        self.frames_delivered += frames;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> SessionSummary {
        let missed_frames = self.missed_counts.values().sum();
        SessionSummary {
            frames_delivered: self.frames_delivered,
            missed_frames,
            overflow_events: self.overflow_events,
            poll_timeouts: self.poll_timeouts,
            rejected_deliveries: self.rejected_deliveries,
            sdk_errors: self.sdk_errors,
            miss_rate: if self.frames_delivered > 0 {
                missed_frames as f64 / self.frames_delivered as f64 * 100.0
            } else {
                0.0
            },
            frame_gap: StatsSummary::from(&self.gap_stats),
            channel_missed_counts: self.missed_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 以 `DiagnosticSink` 形式接入采集引擎的聚合器
#[derive(Debug, Default)]
pub struct AggregatingDiagnostics {
    stats: Mutex<SessionStatsAggregator>,
}

impl AggregatingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_delivered(&self, frames: u64) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_delivered(frames);
    }

    pub fn summary(&self) -> SessionSummary {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

impl DiagnosticSink for AggregatingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(&event);
    }
}

/// 会话摘要
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub frames_delivered: u64,
    pub missed_frames: u64,
    pub overflow_events: u64,
    pub poll_timeouts: u64,
    pub rejected_deliveries: u64,
    pub sdk_errors: u64,
    pub miss_rate: f64,
    pub frame_gap: StatsSummary,
    pub channel_missed_counts: HashMap<String, u64>,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Acquisition Session Summary ===")?;
        writeln!(f, "Frames delivered: {}", self.frames_delivered)?;
        writeln!(
            f,
            "Missed frames: {} ({:.2}%)",
            self.missed_frames, self.miss_rate
        )?;
        writeln!(f, "Buffer overflows: {}", self.overflow_events)?;
        writeln!(f, "Poll timeouts: {}", self.poll_timeouts)?;
        writeln!(f, "Rejected deliveries: {}", self.rejected_deliveries)?;
        writeln!(f, "SDK errors: {}", self.sdk_errors)?;
        writeln!(f, "Frame id gap: {}", self.frame_gap)?;

        if !self.channel_missed_counts.is_empty() {
            writeln!(f, "Missed frames per channel:")?;
            let mut channels: Vec<_> = self.channel_missed_counts.iter().collect();
            channels.sort();
            for (channel, count) in channels {
                writeln!(f, "  {}: {}", channel, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
