//! Scripted SDK 替身
//!
//! 用于无相机环境的测试。帧只在测试显式 `push_frames` 时出现，
//! 不做任何时序或硬件模拟。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    AcquisitionSdk, AcquisitionSettings, CapabilityMetadata, Channel, ChannelCapabilities,
    DeliveredImage, DeliveryError, DiagnosticEvent, DiagnosticSink, FrameConsumer, FrameHeader,
    SdkError, SdkLogRecord, Shape,
};

use crate::reader::Pause;

/// 按 `FrameHeader` 布局编码一串帧，payload 以帧 ID 低字节填充
pub fn encode_frames(
    frame_ids: impl IntoIterator<Item = u64>,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
) -> Vec<u8> {
    let mut out = Vec::new();
    for frame_id in frame_ids {
        let header = FrameHeader::new(
            frame_id,
            frame_id.wrapping_mul(1000),
            width,
            height,
            bytes_per_pixel,
        );
        let payload = vec![frame_id as u8; header.payload_len()];
        append_frame(&mut out, &header, &payload);
    }
    out
}

fn append_frame(out: &mut Vec<u8>, header: &FrameHeader, payload: &[u8]) {
    let start = out.len();
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out.resize(start + header.bytes_of_frame as usize, 0);
}

#[derive(Debug, Default)]
struct ScriptedStream {
    ring: Vec<u8>,
    /// 剩余的"空"轮询次数（即便 ring 中已有数据）
    empty_polls: u32,
    released: usize,
    fail_map: bool,
}

/// 内存中的 SDK 替身
///
/// - 每个通道一个字节 ring，`map_read` 返回整段，`unmap_read` 从头部释放
/// - 引擎未启动时 `map_read` 总是返回空
/// - 记录各调用次数，支持注入 configure/start/map 失败
pub struct ScriptedSdk {
    settings: Mutex<AcquisitionSettings>,
    metadata: CapabilityMetadata,
    streams: [Mutex<ScriptedStream>; 2],
    running: AtomicBool,
    fail_configure: AtomicBool,
    fail_start: AtomicBool,
    configure_calls: AtomicU32,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    abort_calls: AtomicU32,
    map_calls: [AtomicU32; 2],
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

/// `map_read` 返回的区域，持有通道锁直到被 drop
pub struct ScriptedRegion<'a> {
    stream: MutexGuard<'a, ScriptedStream>,
    visible: usize,
}

impl AsRef<[u8]> for ScriptedRegion<'_> {
    fn as_ref(&self) -> &[u8] {
        &self.stream.ring[..self.visible]
    }
}

impl ScriptedSdk {
    /// 创建替身，初始配置为全幅 ROI
    pub fn new(metadata: CapabilityMetadata) -> Self {
        let mut settings = AcquisitionSettings::default();
        for (channel, caps) in settings.channels.iter_mut().zip(&metadata.channels) {
            channel.shape = caps.max_shape;
        }

        Self {
            settings: Mutex::new(settings),
            metadata,
            streams: Default::default(),
            running: AtomicBool::new(false),
            fail_configure: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            configure_calls: AtomicU32::new(0),
            start_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            abort_calls: AtomicU32::new(0),
            map_calls: Default::default(),
            diagnostics: None,
        }
    }

    /// 两个通道传感器尺寸相同，支持 8/16 bit
    pub fn with_sensor(width: u32, height: u32) -> Self {
        let caps = ChannelCapabilities {
            max_shape: Shape { width, height },
            supported_pixel_types: 0x03,
        };
        Self::new(CapabilityMetadata {
            channels: [caps, caps],
        })
    }

    /// SDK 日志转发目标
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    fn stream(&self, channel: Channel) -> MutexGuard<'_, ScriptedStream> {
        self.streams[channel.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current_settings(&self) -> MutexGuard<'_, AcquisitionSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 按当前配置的尺寸与像素类型追加帧
    pub fn push_frames(&self, channel: Channel, frame_ids: impl IntoIterator<Item = u64>) {
        let (shape, bytes_per_pixel) = {
            let settings = self.current_settings();
            let ch = settings.channel(channel);
            (ch.shape, ch.pixel_type.bytes_per_pixel())
        };
        let bytes = encode_frames(frame_ids, shape.width, shape.height, bytes_per_pixel);
        self.push_raw(channel, &bytes);
    }

    /// 追加一帧自定义 payload
    pub fn push_frame(&self, channel: Channel, header: FrameHeader, payload: &[u8]) {
        let mut bytes = Vec::new();
        append_frame(&mut bytes, &header, payload);
        self.push_raw(channel, &bytes);
    }

    /// 追加原始字节（可构造畸形区域）
    pub fn push_raw(&self, channel: Channel, bytes: &[u8]) {
        self.stream(channel).ring.extend_from_slice(bytes);
    }

    /// 接下来 `polls` 次 `map_read` 返回空
    pub fn delay_frames(&self, channel: Channel, polls: u32) {
        self.stream(channel).empty_polls = polls;
    }

    pub fn fail_next_configure(&self) {
        self.fail_configure.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_map(&self, channel: Channel) {
        self.stream(channel).fail_map = true;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn configure_calls(&self) -> u32 {
        self.configure_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> u32 {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn map_calls(&self, channel: Channel) -> u32 {
        self.map_calls[channel.index()].load(Ordering::SeqCst)
    }

    /// 已通过 `unmap_read` 释放的字节总数
    pub fn released_bytes(&self, channel: Channel) -> usize {
        self.stream(channel).released
    }

    /// 仍在 ring 中的字节数
    pub fn pending_bytes(&self, channel: Channel) -> usize {
        self.stream(channel).ring.len()
    }

    fn report(&self, function: &str, message: String) {
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.record(DiagnosticEvent::Sdk(SdkLogRecord {
                is_error: true,
                file: file!().to_string(),
                line: line!(),
                function: function.to_string(),
                message,
            }));
        }
    }
}

impl AcquisitionSdk for ScriptedSdk {
    type Region<'a> = ScriptedRegion<'a>;

    fn configure(&self, settings: &AcquisitionSettings) -> Result<(), SdkError> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_configure.swap(false, Ordering::SeqCst) {
            self.report("configure", "configuration rejected".to_string());
            return Err(SdkError::status("configure", -1));
        }
        *self.current_settings() = settings.clone();
        Ok(())
    }

    fn get_configuration(&self) -> Result<AcquisitionSettings, SdkError> {
        Ok(self.current_settings().clone())
    }

    fn get_configuration_metadata(&self) -> Result<CapabilityMetadata, SdkError> {
        Ok(self.metadata.clone())
    }

    fn start(&self) -> Result<(), SdkError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.swap(false, Ordering::SeqCst) {
            self.report("start", "engine failed to start".to_string());
            return Err(SdkError::status("start", -2));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), SdkError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&self) -> Result<(), SdkError> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn map_read(&self, channel: Channel) -> Result<ScriptedRegion<'_>, SdkError> {
        self.map_calls[channel.index()].fetch_add(1, Ordering::SeqCst);
        let running = self.is_running();
        let mut stream = self.stream(channel);

        if stream.fail_map {
            drop(stream);
            self.report("map_read", format!("stream {} unavailable", channel.index()));
            return Err(SdkError::status("map_read", -3));
        }

        let visible = if !running {
            0
        } else if stream.empty_polls > 0 {
            stream.empty_polls -= 1;
            0
        } else {
            stream.ring.len()
        };

        Ok(ScriptedRegion { stream, visible })
    }

    fn unmap_read(&self, channel: Channel, consumed_bytes: usize) -> Result<(), SdkError> {
        let mut stream = self.stream(channel);
        if consumed_bytes > stream.ring.len() {
            drop(stream);
            self.report(
                "unmap_read",
                format!("release of {consumed_bytes} bytes exceeds mapped region"),
            );
            return Err(SdkError::status("unmap_read", -4));
        }
        stream.ring.drain(..consumed_bytes);
        stream.released += consumed_bytes;
        Ok(())
    }
}

/// 只记录暂停时长、不真正休眠的 `Pause`
///
/// 克隆共享同一份记录。
#[derive(Debug, Clone, Default)]
pub struct CountingPause {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl CountingPause {
    pub fn count(&self) -> usize {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn total(&self) -> Duration {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .sum()
    }
}

impl Pause for CountingPause {
    fn pause(&self, duration: Duration) {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        std::thread::yield_now();
    }
}

/// 一次 `insert_image` 调用的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub channel: Channel,
    pub frame_id: u64,
    /// 像素缓冲的首字节
    pub first_byte: u8,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct ConsumerLog {
    attempts: Vec<DeliveryAttempt>,
    scripted: VecDeque<DeliveryError>,
    clears: usize,
}

/// 记录每次投递的消费者，可预置若干次失败
#[derive(Debug, Default)]
pub struct ScriptedConsumer {
    log: Mutex<ConsumerLog>,
}

impl ScriptedConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的投递依次返回这些错误，之后恢复接受
    pub fn fail_next(&self, errors: impl IntoIterator<Item = DeliveryError>) {
        self.lock().scripted.extend(errors);
    }

    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.lock().attempts.clone()
    }

    /// 被接受的 (channel, frame_id)
    pub fn accepted(&self) -> Vec<(Channel, u64)> {
        self.lock()
            .attempts
            .iter()
            .filter(|a| a.accepted)
            .map(|a| (a.channel, a.frame_id))
            .collect()
    }

    pub fn clears(&self) -> usize {
        self.lock().clears
    }

    fn lock(&self) -> MutexGuard<'_, ConsumerLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameConsumer for ScriptedConsumer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn insert_image(&self, image: DeliveredImage<'_>) -> Result<(), DeliveryError> {
        let mut log = self.lock();
        let outcome = log.scripted.pop_front();
        log.attempts.push(DeliveryAttempt {
            channel: image.metadata.channel,
            frame_id: image.metadata.frame_id,
            first_byte: image.pixels.first().copied().unwrap_or_default(),
            accepted: outcome.is_none(),
        });
        outcome.map_or(Ok(()), Err)
    }

    fn clear_backlog(&self) {
        self.lock().clears += 1;
    }
}
