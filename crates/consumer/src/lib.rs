//! # Consumer
//!
//! 帧消费者参考实现。
//!
//! 负责：
//! - 有界环形缓冲 (`CircularBuffer`)，满时报告 overflow
//! - 日志消费者 (`LogConsumer`)，只输出帧摘要
//! - 原子计数指标 (`ConsumerMetrics`)

pub mod circular;
pub mod error;
pub mod log;
pub mod metrics;

pub use circular::{CircularBuffer, StoredImage};
pub use contracts::{DeliveredImage, DeliveryError, FrameConsumer};
pub use error::ConsumerError;
pub use log::LogConsumer;
pub use metrics::{ConsumerMetrics, MetricsSnapshot};
