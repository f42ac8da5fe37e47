//! DualCamera - device adapter driven by the host shell.
//!
//! Binds one or two SDK streams to a frame pool, a consumer and a live
//! sequencer, and exposes the camera properties the host can change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{
    AcquisitionSdk, AcquisitionSettings, CapabilityMetadata, Channel, DeliveryMode, DeviceConfig,
    DiagnosticSink, FrameConsumer, FrameMetadata, Offset, SampleType, ALLOWED_BINNING,
};
use tracing::instrument;

use crate::buffer::{lock_pool, FramePool, ImageBuffer};
use crate::error::{AcquisitionError, Result};
use crate::reader::{Pause, StreamReader, ThreadPause};
use crate::sequencer::{
    Delivery, DrainPlan, LiveSequencer, SequenceRequest, SequencerState, SessionReport,
};
use crate::snapshot::SingleShot;

/// Dual-stream camera device
pub struct DualCamera<S: AcquisitionSdk + 'static, P: Pause + Clone + 'static = ThreadPause> {
    config: DeviceConfig,
    sdk: Arc<S>,
    pool: Arc<Mutex<FramePool>>,
    reader: StreamReader<P>,
    sequencer: LiveSequencer<S, P>,
    diagnostics: Arc<dyn DiagnosticSink>,
    capabilities: CapabilityMetadata,
    current: Channel,
    initialized: bool,
}

impl<S: AcquisitionSdk + 'static> DualCamera<S, ThreadPause> {
    pub fn new(
        config: DeviceConfig,
        sdk: Arc<S>,
        consumer: Arc<dyn FrameConsumer>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self::with_pause(config, sdk, consumer, diagnostics, ThreadPause)
    }
}

impl<S: AcquisitionSdk + 'static, P: Pause + Clone + 'static> DualCamera<S, P> {
    /// Device whose stream polls pause through `pause`
    pub fn with_pause(
        config: DeviceConfig,
        sdk: Arc<S>,
        consumer: Arc<dyn FrameConsumer>,
        diagnostics: Arc<dyn DiagnosticSink>,
        pause: P,
    ) -> Self {
        let pool = Arc::new(Mutex::new(FramePool::new()));
        let reader = StreamReader::with_pause(config.retry, pause);
        let sequencer = LiveSequencer::new(
            Arc::clone(&sdk),
            Arc::clone(&pool),
            consumer,
            Arc::clone(&diagnostics),
            reader.clone(),
        );

        Self {
            config,
            sdk,
            pool,
            reader,
            sequencer,
            diagnostics,
            capabilities: CapabilityMetadata::default(),
            current: Channel::Primary,
            initialized: false,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Validate the camera selection and submit the initial configuration.
    ///
    /// Initial settings: full sensor ROI at offset (0, 0), one-frame limit,
    /// plus the configured binning, pixel type and exposure.
    #[instrument(
        name = "dual_camera_initialize",
        skip(self),
        fields(primary = %self.config.cameras.primary, secondary = %self.config.cameras.secondary)
    )]
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let cameras = &self.config.cameras;
        if let Some(message) = cameras.selection_error() {
            return Err(AcquisitionError::invalid_selection(message));
        }
        check_binning(self.config.binning)?;
        let exposure_us = ms_to_us(self.config.exposure_ms)?;

        let capabilities = self.sdk.get_configuration_metadata()?;
        let primary = *capabilities.channel(Channel::Primary);
        if !primary.supports(self.config.pixel_type) {
            return Err(AcquisitionError::UnsupportedPixelType(
                self.config.pixel_type,
            ));
        }

        let secondary_camera = if cameras.is_dual() {
            cameras.secondary.clone()
        } else {
            String::new()
        };
        let settings = self
            .sdk
            .get_configuration()?
            .with_camera(Channel::Primary, cameras.primary.clone())
            .with_camera(Channel::Secondary, secondary_camera)
            .with_roi(Offset::default(), primary.max_shape)
            .with_binning(self.config.binning)
            .with_pixel_type(self.config.pixel_type)
            .with_exposure_us(exposure_us)
            .with_max_frame_count(1);

        self.capabilities = capabilities;
        self.apply(&settings)?;
        self.initialized = true;

        tracing::info!(
            channels = self.config.cameras.channel_count(),
            width = primary.max_shape.width,
            height = primary.max_shape.height,
            "camera initialized"
        );
        Ok(())
    }

    /// Stop any live session and mark the device uninitialized
    #[instrument(name = "dual_camera_shutdown", skip(self))]
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        match self.sequencer.stop() {
            Ok(_) | Err(AcquisitionError::NotRunning) => {}
            Err(e) => tracing::warn!(error = %e, "live session ended with error during shutdown"),
        }
        self.initialized = false;
        Ok(())
    }

    /// Capture one frame per active channel into the image buffers
    #[instrument(name = "dual_camera_snap", skip(self))]
    pub fn snap_image(&mut self) -> Result<Vec<FrameMetadata>> {
        self.ensure_idle()?;
        let shot = SingleShot::new(&*self.sdk, &self.reader, &*self.diagnostics);
        let mut pool = lock_pool(&self.pool);
        shot.capture(&mut pool, self.active_channels())
    }

    /// Start live acquisition; `frame_count == 0` runs until stopped
    pub fn start_sequence(
        &mut self,
        frame_count: u64,
        interval_hint: Duration,
        stop_on_overflow: bool,
    ) -> Result<()> {
        self.ensure_initialized()?;

        let delivery = match self.config.delivery {
            DeliveryMode::MultiChannel => Delivery::AllChannels,
            DeliveryMode::SingleChannel => Delivery::Selected(self.current),
        };
        let plan = DrainPlan {
            channels: self.active_channels().to_vec(),
            delivery,
            cameras: [
                self.config.cameras.primary.clone(),
                self.config.cameras.secondary.clone(),
            ],
        };
        let request = SequenceRequest {
            frame_count,
            interval_hint,
            stop_on_overflow,
        };

        self.sequencer.start(request, plan)
    }

    /// Stop live acquisition and return the session report
    pub fn stop_sequence(&mut self) -> Result<SessionReport> {
        self.sequencer.stop()
    }

    pub fn is_capturing(&self) -> bool {
        self.sequencer.is_active()
    }

    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Abort the engine immediately and join any live session
    #[instrument(name = "dual_camera_abort", skip(self))]
    pub fn abort(&mut self) -> Result<()> {
        self.sequencer.request_stop();
        let aborted = self.sdk.abort();
        match self.sequencer.stop() {
            Ok(_) | Err(AcquisitionError::NotRunning) => {}
            Err(e) => tracing::warn!(error = %e, "live session ended with error during abort"),
        }
        aborted.map_err(AcquisitionError::from)
    }

    // ===== Channels =====

    /// Streams acquired from (1 or 2)
    fn active_channels(&self) -> &'static [Channel] {
        Channel::active(self.config.cameras.channel_count())
    }

    /// Channels delivered to the host
    pub fn channel_count(&self) -> usize {
        match self.config.delivery {
            DeliveryMode::MultiChannel => self.config.cameras.channel_count(),
            DeliveryMode::SingleChannel => 1,
        }
    }

    pub fn channel_name(&self, index: usize) -> Result<&'static str> {
        Channel::from_index(index)
            .filter(|_| index < self.channel_count())
            .map(Channel::name)
            .ok_or(AcquisitionError::InvalidChannel {
                index,
                count: self.channel_count(),
            })
    }

    /// Camera delivered in single-channel mode
    pub fn current_channel(&self) -> Channel {
        self.current
    }

    pub fn set_current_channel(&mut self, channel: Channel) -> Result<()> {
        if !self.active_channels().contains(&channel) {
            return Err(AcquisitionError::InvalidChannel {
                index: channel.index(),
                count: self.active_channels().len(),
            });
        }
        self.current = channel;
        Ok(())
    }

    /// Select the current channel by camera device name
    pub fn select_camera(&mut self, camera: &str) -> Result<()> {
        let channel = if camera == self.config.cameras.primary {
            Channel::Primary
        } else if self.config.cameras.is_dual() && camera == self.config.cameras.secondary {
            Channel::Secondary
        } else {
            return Err(AcquisitionError::invalid_selection(format!(
                "camera '{camera}' is not open on this device"
            )));
        };
        self.set_current_channel(channel)
    }

    // ===== Properties =====

    pub fn pixel_type(&self) -> Result<SampleType> {
        Ok(self.settings()?.channel(Channel::Primary).pixel_type)
    }

    /// Pixel types the primary camera reports
    pub fn allowed_pixel_types(&self) -> Vec<SampleType> {
        self.capabilities.channel(Channel::Primary).pixel_types()
    }

    pub fn set_pixel_type(&mut self, pixel_type: SampleType) -> Result<()> {
        self.ensure_idle()?;
        if !self
            .capabilities
            .channel(Channel::Primary)
            .supports(pixel_type)
        {
            return Err(AcquisitionError::UnsupportedPixelType(pixel_type));
        }
        let settings = self.settings()?.with_pixel_type(pixel_type);
        self.apply(&settings)
    }

    pub fn binning(&self) -> Result<u8> {
        Ok(self.settings()?.channel(Channel::Primary).binning)
    }

    pub fn set_binning(&mut self, binning: u8) -> Result<()> {
        self.ensure_idle()?;
        check_binning(binning)?;
        let settings = self.settings()?.with_binning(binning);
        self.apply(&settings)
    }

    /// Exposure in milliseconds
    pub fn exposure_ms(&self) -> Result<f64> {
        let us = self.settings()?.channel(Channel::Primary).exposure_time_us;
        Ok(f64::from(us) / 1000.0)
    }

    /// Set exposure on both channels
    pub fn set_exposure_ms(&mut self, exposure_ms: f64) -> Result<()> {
        self.ensure_initialized()?;
        let exposure_us = ms_to_us(exposure_ms)?;
        let settings = self.settings()?.with_exposure_us(exposure_us);
        self.sdk
            .configure(&settings)
            .map_err(AcquisitionError::configure_failed)
    }

    // ===== Geometry =====

    pub fn image_width(&self) -> u32 {
        self.primary_geometry(|b| b.width())
    }

    pub fn image_height(&self) -> u32 {
        self.primary_geometry(|b| b.height())
    }

    pub fn image_bytes_per_pixel(&self) -> u32 {
        self.primary_geometry(|b| b.bytes_per_pixel())
    }

    pub fn bit_depth(&self) -> u32 {
        self.image_bytes_per_pixel() * 8
    }

    pub fn image_buffer_size(&self) -> usize {
        lock_pool(&self.pool)
            .read(Channel::Primary)
            .map(|b| b.capacity())
            .unwrap_or(0)
    }

    /// Run `f` over a channel's last captured pixels
    pub fn with_image_buffer<R>(&self, channel: Channel, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let pool = lock_pool(&self.pool);
        let buffer = pool.read(channel)?;
        Ok(f(buffer.pixels()))
    }

    fn primary_geometry(&self, get: impl Fn(&ImageBuffer) -> u32) -> u32 {
        lock_pool(&self.pool)
            .read(Channel::Primary)
            .map(get)
            .unwrap_or(0)
    }

    // ===== Internals =====

    fn settings(&self) -> Result<AcquisitionSettings> {
        self.ensure_initialized()?;
        Ok(self.sdk.get_configuration()?)
    }

    /// Submit settings, then size the pool from what the SDK reports back
    fn apply(&mut self, settings: &AcquisitionSettings) -> Result<()> {
        self.sdk
            .configure(settings)
            .map_err(AcquisitionError::configure_failed)?;

        let applied = self.sdk.get_configuration()?;
        let primary = applied.channel(Channel::Primary);
        lock_pool(&self.pool).resize(
            self.config.cameras.channel_count(),
            primary.shape.width,
            primary.shape.height,
            primary.pixel_type.bytes_per_pixel(),
        )
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(AcquisitionError::NotInitialized)
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        self.ensure_initialized()?;
        if self.sequencer.is_active() {
            return Err(AcquisitionError::AlreadyRunning);
        }
        Ok(())
    }
}

fn check_binning(binning: u8) -> Result<()> {
    if ALLOWED_BINNING.contains(&binning) {
        Ok(())
    } else {
        Err(AcquisitionError::InvalidBinning(binning))
    }
}

/// Exposure must be a finite, non-negative duration once narrowed to f32
fn ms_to_us(ms: f64) -> Result<f32> {
    let us = (ms * 1000.0) as f32;
    if ms.is_finite() && ms >= 0.0 && us.is_finite() {
        Ok(us)
    } else {
        Err(AcquisitionError::InvalidExposure(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::mock::{ScriptedConsumer, ScriptedSdk};
    use contracts::{CameraConfig, ChannelCapabilities, RetryConfig, Shape};
    use std::thread;
    use std::time::Instant;

    fn config(cameras: CameraConfig) -> DeviceConfig {
        let mut config = DeviceConfig::new(cameras);
        config.retry = RetryConfig {
            interval_ms: 1,
            max_retries: 2,
        };
        config
    }

    type Harness = (DualCamera<ScriptedSdk>, Arc<ScriptedSdk>, Arc<ScriptedConsumer>);

    fn camera(cameras: CameraConfig, sdk: ScriptedSdk) -> Harness {
        camera_with(config(cameras), sdk)
    }

    fn camera_with(config: DeviceConfig, sdk: ScriptedSdk) -> Harness {
        let sdk = Arc::new(sdk);
        let consumer = Arc::new(ScriptedConsumer::new());
        let device = DualCamera::new(
            config,
            Arc::clone(&sdk),
            consumer.clone(),
            Arc::new(RecordingDiagnostics::new()),
        );
        (device, sdk, consumer)
    }

    fn dual() -> CameraConfig {
        CameraConfig::dual("cam-a", "cam-b")
    }

    fn wait_idle(device: &DualCamera<ScriptedSdk>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while device.is_capturing() {
            assert!(Instant::now() < deadline, "session did not end");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_initialize_rejects_bad_selections() {
        for cameras in [
            CameraConfig::single("None"),
            CameraConfig::dual("cam-a", "cam-a"),
            CameraConfig::dual("simulated: empty", "cam-b"),
        ] {
            let (mut device, sdk, _) = camera(cameras, ScriptedSdk::with_sensor(4, 4));
            assert!(matches!(
                device.initialize(),
                Err(AcquisitionError::InvalidCameraSelection { .. })
            ));
            assert!(!device.is_initialized());
            assert_eq!(sdk.configure_calls(), 0);
        }
    }

    #[test]
    fn test_initialize_submits_initial_settings() {
        let (mut device, sdk, _) = camera(dual(), ScriptedSdk::with_sensor(8, 6));
        device.initialize().unwrap();

        let settings = sdk.get_configuration().unwrap();
        for ch in &settings.channels {
            assert_eq!(ch.binning, 1);
            assert_eq!(ch.shape, Shape { width: 8, height: 6 });
            assert_eq!(ch.offset, Offset::default());
            assert_eq!(ch.max_frame_count, 1);
            assert_eq!(ch.exposure_time_us, 20000.0);
        }
        assert_eq!(settings.channel(Channel::Primary).camera, "cam-a");
        assert_eq!(settings.channel(Channel::Secondary).camera, "cam-b");

        assert_eq!(device.image_width(), 8);
        assert_eq!(device.image_height(), 6);
        assert_eq!(device.image_buffer_size(), 48);
        assert_eq!(device.channel_count(), 2);
        assert_eq!(device.channel_name(1).unwrap(), "Camera-2");
    }

    #[test]
    fn test_single_camera_leaves_second_stream_unused() {
        let (mut device, sdk, _) =
            camera(CameraConfig::single("cam-a"), ScriptedSdk::with_sensor(4, 4));
        device.initialize().unwrap();

        assert_eq!(sdk.get_configuration().unwrap().channels[1].camera, "");
        assert_eq!(device.channel_count(), 1);
        assert!(device.channel_name(1).is_err());
        assert!(device.set_current_channel(Channel::Secondary).is_err());
    }

    #[test]
    fn test_snap_fills_both_buffers() {
        let (mut device, sdk, _) = camera(dual(), ScriptedSdk::with_sensor(2, 2));
        device.initialize().unwrap();
        sdk.push_frames(Channel::Primary, [3]);
        sdk.push_frames(Channel::Secondary, [4]);

        let captured = device.snap_image().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[1].camera, "cam-b");

        let pixels = device
            .with_image_buffer(Channel::Secondary, |p| p.to_vec())
            .unwrap();
        assert_eq!(pixels, vec![4, 4, 4, 4]);
        assert_eq!(sdk.stop_calls(), 1);
    }

    #[test]
    fn test_calls_before_initialize_fail() {
        let (mut device, _, _) = camera(dual(), ScriptedSdk::with_sensor(2, 2));
        assert!(matches!(
            device.snap_image(),
            Err(AcquisitionError::NotInitialized)
        ));
        assert!(matches!(
            device.start_sequence(1, Duration::ZERO, false),
            Err(AcquisitionError::NotInitialized)
        ));
        assert_eq!(device.image_width(), 0);
    }

    #[test]
    fn test_pixel_type_follows_capabilities() {
        let caps = ChannelCapabilities {
            max_shape: Shape {
                width: 2,
                height: 2,
            },
            supported_pixel_types: 0x01,
        };
        let sdk = ScriptedSdk::new(CapabilityMetadata {
            channels: [caps, caps],
        });
        let (mut device, _, _) = camera(dual(), sdk);
        device.initialize().unwrap();

        assert_eq!(device.allowed_pixel_types(), vec![SampleType::U8]);
        assert!(matches!(
            device.set_pixel_type(SampleType::U16),
            Err(AcquisitionError::UnsupportedPixelType(SampleType::U16))
        ));
    }

    #[test]
    fn test_sixteen_bit_resizes_buffers() {
        let (mut device, _, _) = camera(dual(), ScriptedSdk::with_sensor(4, 4));
        device.initialize().unwrap();

        device.set_pixel_type(SampleType::U16).unwrap();
        assert_eq!(device.pixel_type().unwrap(), SampleType::U16);
        assert_eq!(device.image_bytes_per_pixel(), 2);
        assert_eq!(device.bit_depth(), 16);
        assert_eq!(device.image_buffer_size(), 32);
    }

    #[test]
    fn test_binning_and_exposure() {
        let (mut device, sdk, _) = camera(dual(), ScriptedSdk::with_sensor(4, 4));
        device.initialize().unwrap();

        assert!(matches!(
            device.set_binning(3),
            Err(AcquisitionError::InvalidBinning(3))
        ));
        device.set_binning(4).unwrap();
        assert_eq!(device.binning().unwrap(), 4);

        device.set_exposure_ms(12.5).unwrap();
        assert!((device.exposure_ms().unwrap() - 12.5).abs() < 1e-6);
        let settings = sdk.get_configuration().unwrap();
        assert_eq!(settings.channels[0].exposure_time_us, 12500.0);
        assert_eq!(settings.channels[1].exposure_time_us, 12500.0);
    }

    #[test]
    fn test_invalid_exposure_rejected() {
        let (mut device, sdk, _) = camera(dual(), ScriptedSdk::with_sensor(4, 4));
        device.initialize().unwrap();
        let calls = sdk.configure_calls();

        for exposure in [f64::NAN, f64::INFINITY, -1.0, 1e300] {
            assert!(matches!(
                device.set_exposure_ms(exposure),
                Err(AcquisitionError::InvalidExposure(_))
            ));
        }
        assert_eq!(sdk.configure_calls(), calls);
        assert!((device.exposure_ms().unwrap() - 20.0).abs() < 1e-6);

        let mut config = config(dual());
        config.exposure_ms = -5.0;
        let (mut device, sdk, _) = camera_with(config, ScriptedSdk::with_sensor(4, 4));
        assert!(matches!(
            device.initialize(),
            Err(AcquisitionError::InvalidExposure(ms)) if ms == -5.0
        ));
        assert!(!device.is_initialized());
        assert_eq!(sdk.configure_calls(), 0);
    }

    #[test]
    fn test_settings_locked_while_capturing() {
        let (mut device, _, _) = camera(dual(), ScriptedSdk::with_sensor(2, 2));
        device.initialize().unwrap();
        device.start_sequence(0, Duration::from_millis(10), false).unwrap();

        assert!(device.is_capturing());
        assert!(matches!(
            device.set_binning(2),
            Err(AcquisitionError::AlreadyRunning)
        ));
        assert!(matches!(
            device.set_pixel_type(SampleType::U16),
            Err(AcquisitionError::AlreadyRunning)
        ));
        assert!(matches!(
            device.snap_image(),
            Err(AcquisitionError::AlreadyRunning)
        ));

        let report = device.stop_sequence().unwrap();
        assert_eq!(report.interval_hint, Duration::from_millis(10));
        assert!(!device.is_capturing());
        device.set_binning(2).unwrap();
    }

    #[test]
    fn test_single_channel_delivery_uses_selected_camera() {
        let mut config = config(dual());
        config.delivery = DeliveryMode::SingleChannel;
        let (mut device, sdk, consumer) = camera_with(config, ScriptedSdk::with_sensor(2, 2));
        device.initialize().unwrap();
        device.select_camera("cam-b").unwrap();
        assert_eq!(device.current_channel(), Channel::Secondary);
        assert_eq!(device.channel_count(), 1);

        sdk.push_frames(Channel::Primary, [1, 2]);
        sdk.push_frames(Channel::Secondary, [1, 2]);
        device.start_sequence(2, Duration::ZERO, false).unwrap();
        wait_idle(&device);
        device.stop_sequence().unwrap();

        assert_eq!(
            consumer.accepted(),
            vec![(Channel::Secondary, 1), (Channel::Secondary, 2)]
        );
    }

    #[test]
    fn test_abort_joins_live_session() {
        let (mut device, sdk, _) = camera(dual(), ScriptedSdk::with_sensor(2, 2));
        device.initialize().unwrap();
        device.start_sequence(0, Duration::ZERO, false).unwrap();

        device.abort().unwrap();
        assert!(!device.is_capturing());
        assert_eq!(sdk.abort_calls(), 1);
        assert!(matches!(
            device.stop_sequence(),
            Err(AcquisitionError::NotRunning)
        ));
    }

    #[test]
    fn test_shutdown_stops_session() {
        let (mut device, sdk, _) = camera(dual(), ScriptedSdk::with_sensor(2, 2));
        device.initialize().unwrap();
        device.start_sequence(0, Duration::ZERO, false).unwrap();

        device.shutdown().unwrap();
        assert!(!device.is_initialized());
        assert!(!device.is_capturing());
        assert_eq!(sdk.stop_calls(), 1);
    }
}
