//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置加载到设备初始化
//! - 模拟 e2e 测试（ScriptedSdk -> DualCamera -> CircularBuffer）

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{DeliveryMode, SampleType};

    #[test]
    fn test_toml_and_json_agree() {
        let toml = r#"
delivery = "single_channel"
pixel_type = "u16"
[cameras]
primary = "cam-a"
secondary = "cam-b"
"#;
        let json = r#"{
            "delivery": "single_channel",
            "pixel_type": "u16",
            "cameras": { "primary": "cam-a", "secondary": "cam-b" }
        }"#;

        let from_toml = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        let from_json = ConfigLoader::load_from_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(from_toml, from_json);
        assert_eq!(from_toml.delivery, DeliveryMode::SingleChannel);
        assert_eq!(from_toml.pixel_type, SampleType::U16);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use acquisition::mock::ScriptedSdk;
    use acquisition::{AcquisitionError, DualCamera, SequencerState, SessionReport};
    use config_loader::{ConfigFormat, ConfigLoader};
    use consumer::CircularBuffer;
    use contracts::{Channel, DeviceConfig, SampleType};
    use observability::AggregatingDiagnostics;

    const DUAL: &str = r#"
consumer_capacity = 64
[cameras]
primary = "simulated: radial sin"
secondary = "simulated: radial cos"
[retry]
interval_ms = 1
max_retries = 20
"#;

    struct Rig {
        sdk: Arc<ScriptedSdk>,
        buffer: Arc<CircularBuffer>,
        diagnostics: Arc<AggregatingDiagnostics>,
        camera: DualCamera<ScriptedSdk>,
    }

    fn rig(config: DeviceConfig) -> Rig {
        let diagnostics = Arc::new(AggregatingDiagnostics::new());
        let sdk = Arc::new(ScriptedSdk::with_sensor(8, 6).with_diagnostics(diagnostics.clone()));
        let buffer = Arc::new(CircularBuffer::with_capacity(config.consumer_capacity).unwrap());
        let mut camera = DualCamera::new(
            config,
            Arc::clone(&sdk),
            buffer.clone(),
            diagnostics.clone(),
        );
        camera.initialize().unwrap();
        Rig {
            sdk,
            buffer,
            diagnostics,
            camera,
        }
    }

    fn dual_config() -> DeviceConfig {
        ConfigLoader::load_from_str(DUAL, ConfigFormat::Toml).unwrap()
    }

    fn finish(camera: &mut DualCamera<ScriptedSdk>) -> SessionReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        while camera.is_capturing() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        camera.stop_sequence().unwrap()
    }

    fn drain(buffer: &CircularBuffer) -> Vec<(Channel, u64)> {
        std::iter::from_fn(|| buffer.pop())
            .map(|image| (image.metadata.channel, image.metadata.frame_id))
            .collect()
    }

    /// Snapshot then bounded live sequence through the circular buffer
    #[test]
    fn test_dual_snapshot_then_sequence() {
        let mut rig = rig(dual_config());
        assert_eq!(rig.camera.image_width(), 8);
        assert_eq!(rig.camera.image_height(), 6);
        assert_eq!(rig.camera.channel_count(), 2);

        rig.sdk.push_frames(Channel::Primary, [0]);
        rig.sdk.push_frames(Channel::Secondary, [0]);
        let snapped = rig.camera.snap_image().unwrap();
        assert_eq!(snapped.len(), 2);
        assert_eq!(snapped[1].camera, "simulated: radial cos");
        assert!(rig.buffer.is_empty());

        rig.sdk.push_frames(Channel::Primary, 1..=5);
        rig.sdk.push_frames(Channel::Secondary, 1..=5);
        rig.camera
            .start_sequence(5, Duration::from_millis(1), false)
            .unwrap();
        let report = finish(&mut rig.camera);

        assert_eq!(report.frames_delivered, 5);
        assert_eq!(report.missed_frames, 0);
        assert_eq!(rig.camera.sequencer_state(), SequencerState::Idle);

        let delivered = drain(&rig.buffer);
        assert_eq!(delivered.len(), 10);
        assert_eq!(delivered[0], (Channel::Primary, 1));
        assert_eq!(delivered[1], (Channel::Secondary, 1));
        assert_eq!(delivered[9], (Channel::Secondary, 5));

        // every mapped byte released back to the SDK
        assert_eq!(rig.sdk.pending_bytes(Channel::Primary), 0);
        assert_eq!(rig.sdk.pending_bytes(Channel::Secondary), 0);
    }

    /// A gap on camera 2 is reported but the set is still delivered
    #[test]
    fn test_missed_frame_reaches_diagnostics() {
        let mut rig = rig(dual_config());
        rig.sdk.push_frames(Channel::Primary, [10, 11, 12]);
        rig.sdk.push_frames(Channel::Secondary, [10, 11, 13]);

        rig.camera
            .start_sequence(3, Duration::from_millis(1), false)
            .unwrap();
        let report = finish(&mut rig.camera);
        assert_eq!(report.frames_delivered, 3);
        assert_eq!(report.missed_frames, 1);

        let summary = rig.diagnostics.summary();
        assert_eq!(summary.missed_frames, 1);
        assert_eq!(
            summary.channel_missed_counts.get(Channel::Secondary.name()),
            Some(&1)
        );
        assert_eq!(drain(&rig.buffer).len(), 6);
    }

    /// Full backlog is cleared and acquisition continues
    #[test]
    fn test_overflow_clears_backlog_and_continues() {
        let mut config = dual_config();
        config.consumer_capacity = 3;
        let mut rig = rig(config);
        rig.sdk.push_frames(Channel::Primary, 1..=4);
        rig.sdk.push_frames(Channel::Secondary, 1..=4);

        rig.camera
            .start_sequence(4, Duration::from_millis(1), false)
            .unwrap();
        let report = finish(&mut rig.camera);

        // sets 2 and 4 overflow on camera 2
        assert_eq!(report.frames_delivered, 4);
        assert_eq!(report.overflow_events, 2);
        assert_eq!(rig.diagnostics.summary().overflow_events, 2);

        let metrics = rig.buffer.metrics().snapshot();
        assert_eq!(metrics.overflow_count, 2);
        assert_eq!(metrics.cleared_count, 6);
        assert!(rig.buffer.is_empty());
    }

    /// stop_on_overflow ends the session with an error
    #[test]
    fn test_stop_on_overflow_fails_session() {
        let mut config = dual_config();
        config.consumer_capacity = 1;
        let mut rig = rig(config);
        rig.sdk.push_frames(Channel::Primary, 1..=2);
        rig.sdk.push_frames(Channel::Secondary, 1..=2);

        rig.camera
            .start_sequence(2, Duration::from_millis(1), true)
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while rig.camera.is_capturing() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        let err = rig.camera.stop_sequence().unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::BufferOverflow {
                channel: Channel::Secondary,
                frame_id: 1
            }
        ));
        assert!(!rig.sdk.is_running());
    }

    /// Single-channel delivery only hands the selected camera to the consumer
    #[test]
    fn test_single_channel_delivery_of_camera_two() {
        let mut config = dual_config();
        config.delivery = contracts::DeliveryMode::SingleChannel;
        let mut rig = rig(config);
        assert_eq!(rig.camera.channel_count(), 1);
        rig.camera.select_camera("simulated: radial cos").unwrap();

        rig.sdk.push_frames(Channel::Primary, 1..=3);
        rig.sdk.push_frames(Channel::Secondary, 1..=3);
        rig.camera
            .start_sequence(3, Duration::from_millis(1), false)
            .unwrap();
        finish(&mut rig.camera);

        assert_eq!(
            drain(&rig.buffer),
            vec![
                (Channel::Secondary, 1),
                (Channel::Secondary, 2),
                (Channel::Secondary, 3)
            ]
        );
    }

    /// 16-bit frames flow end to end
    #[test]
    fn test_sixteen_bit_pixels() {
        let mut config = dual_config();
        config.pixel_type = SampleType::U16;
        let mut rig = rig(config);
        assert_eq!(rig.camera.bit_depth(), 16);
        assert_eq!(rig.camera.image_buffer_size(), 8 * 6 * 2);

        rig.sdk.push_frames(Channel::Primary, [7]);
        rig.sdk.push_frames(Channel::Secondary, [7]);
        rig.camera.snap_image().unwrap();

        let pixels = rig
            .camera
            .with_image_buffer(Channel::Secondary, |pixels| pixels.to_vec())
            .unwrap();
        assert_eq!(pixels.len(), 96);
        assert!(pixels.iter().all(|&b| b == 7));
    }

    /// A stalled stream times out without ending an unbounded session
    #[test]
    fn test_unbounded_session_survives_timeouts() {
        let mut rig = rig(dual_config());
        rig.camera
            .start_sequence(0, Duration::from_millis(1), false)
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(rig.camera.is_capturing());

        rig.sdk.push_frames(Channel::Primary, [1]);
        rig.sdk.push_frames(Channel::Secondary, [1]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while rig.buffer.len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        let report = rig.camera.stop_sequence().unwrap();
        assert!(report.timeouts > 0);
        assert_eq!(report.frames_delivered, 1);
        assert!(rig.diagnostics.summary().poll_timeouts > 0);
        assert!(!rig.sdk.is_running());
    }

    /// Async reader drains images while the live thread produces them
    #[tokio::test]
    async fn test_async_reader_sees_every_image() {
        let mut rig = rig(dual_config());
        rig.sdk.push_frames(Channel::Primary, 1..=8);
        rig.sdk.push_frames(Channel::Secondary, 1..=8);

        let buffer = Arc::clone(&rig.buffer);
        let reader = tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..16 {
                let image = tokio::time::timeout(Duration::from_secs(5), buffer.next())
                    .await
                    .unwrap();
                ids.push(image.metadata.frame_id);
            }
            ids
        });

        rig.camera
            .start_sequence(8, Duration::from_millis(1), false)
            .unwrap();
        let ids = reader.await.unwrap();
        let report = finish(&mut rig.camera);

        assert_eq!(report.frames_delivered, 8);
        assert_eq!(ids.len(), 16);
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }
}
