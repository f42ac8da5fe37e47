//! `simulate` command implementation.
//!
//! Drives the device adapter against the scripted SDK: one snapshot, then a
//! bounded live sequence drained by an async reader of the circular buffer.

use std::sync::Arc;
use std::time::Duration;

use acquisition::mock::ScriptedSdk;
use acquisition::{AcquisitionError, DualCamera, SessionReport};
use anyhow::{bail, Context, Result};
use consumer::{CircularBuffer, MetricsSnapshot};
use contracts::{CameraConfig, Channel, DeviceConfig};
use observability::{AggregatingDiagnostics, SessionSummary};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::SimulateArgs;

const SIMULATED_PAIR: (&str, &str) = ("simulated: radial sin", "simulated: radial cos");

/// Session outcome for JSON output
#[derive(Serialize)]
struct SimulationResult {
    frames_requested: u64,
    frames_delivered: u64,
    images_received: u64,
    overflow_events: u64,
    missed_frames: u64,
    timeouts: u64,
    consumer_overflows: u64,
    consumer_cleared: u64,
}

/// Execute the `simulate` command
pub async fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let config = load_config(args)?;
    check_frame_target(args, config.cameras.channel_count())?;

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let diagnostics = Arc::new(AggregatingDiagnostics::new());
    let sdk = Arc::new(
        ScriptedSdk::with_sensor(args.width, args.height).with_diagnostics(diagnostics.clone()),
    );
    let buffer = Arc::new(
        CircularBuffer::named("simulate", config.consumer_capacity)
            .context("Failed to create consumer buffer")?,
    );
    let channels = Channel::active(config.cameras.channel_count());

    let mut camera = DualCamera::new(
        config,
        Arc::clone(&sdk),
        buffer.clone(),
        diagnostics.clone(),
    );
    camera.initialize().context("Failed to initialize device")?;
    info!(
        width = camera.image_width(),
        height = camera.image_height(),
        bit_depth = camera.bit_depth(),
        channels = camera.channel_count(),
        "Device initialized"
    );

    for &channel in channels {
        sdk.push_frames(channel, [0]);
    }
    let snapped = camera.snap_image().context("Snapshot failed")?;
    for meta in &snapped {
        info!(channel = %meta.channel, camera = %meta.camera, frame_id = meta.frame_id, "Snapshot");
    }

    let target = feed_frames(&sdk, channels, args.frames, args.drop_every);
    let drain = spawn_drain(Arc::clone(&buffer));

    camera
        .start_sequence(
            target,
            Duration::from_millis(args.interval_ms),
            args.stop_on_overflow,
        )
        .context("Failed to start live acquisition")?;
    info!(frames = target, "Live acquisition started");

    let report = wait_for_session(&mut camera).await?;
    let images_received = drain.await.context("Consumer reader task failed")?;

    if let Some(ref report) = report {
        diagnostics.add_delivered(report.frames_delivered);
    }
    camera.shutdown().context("Failed to shut down device")?;

    let summary = diagnostics.summary();
    let consumer_metrics = buffer.metrics().snapshot();
    if args.json {
        let result = build_result(target, report.as_ref(), images_received, &consumer_metrics);
        let json =
            serde_json::to_string_pretty(&result).context("Failed to serialize session result")?;
        println!("{}", json);
    } else {
        print_summary(&summary, &consumer_metrics, images_received);
    }

    Ok(())
}

fn load_config(args: &SimulateArgs) -> Result<DeviceConfig> {
    match &args.config {
        Some(path) => config_loader::ConfigLoader::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(DeviceConfig::new(CameraConfig::dual(
            SIMULATED_PAIR.0,
            SIMULATED_PAIR.1,
        ))),
    }
}

/// A zero target would start an unbounded sequence
fn check_frame_target(args: &SimulateArgs, channel_count: usize) -> Result<()> {
    if args.frames == 0 {
        bail!("--frames must be at least 1");
    }
    if channel_count > 1 && args.drop_every == 1 {
        bail!("--drop-every 1 drops every frame of camera 2; nothing to synchronize");
    }
    Ok(())
}

/// Queue `frames` frames per channel; returns the number of frame sets
/// the streams can align into
fn feed_frames(sdk: &ScriptedSdk, channels: &[Channel], frames: u64, drop_every: u64) -> u64 {
    let mut target = frames;
    for &channel in channels {
        let ids: Vec<u64> = (1..=frames)
            .filter(|id| channel == Channel::Primary || drop_every == 0 || id % drop_every != 0)
            .collect();
        target = target.min(ids.len() as u64);
        sdk.push_frames(channel, ids);
    }
    target
}

fn spawn_drain(buffer: Arc<CircularBuffer>) -> tokio::task::JoinHandle<u64> {
    tokio::spawn(async move {
        let mut received = 0u64;
        while let Ok(image) = tokio::time::timeout(Duration::from_millis(250), buffer.next()).await
        {
            received += 1;
            debug!(
                channel = %image.metadata.channel,
                frame_id = image.metadata.frame_id,
                bytes = image.pixels.len(),
                "Image drained"
            );
        }
        received
    })
}

/// Wait for the bounded sequence to finish, aborting on Ctrl+C
async fn wait_for_session(camera: &mut DualCamera<ScriptedSdk>) -> Result<Option<SessionReport>> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    while camera.is_capturing() {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("Received shutdown signal, aborting acquisition...");
                camera.abort().context("Abort failed")?;
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
    }

    match camera.stop_sequence() {
        Ok(report) => {
            info!(
                frames = report.frames_delivered,
                cycles = report.cycles,
                overflows = report.overflow_events,
                missed = report.missed_frames,
                "Live acquisition finished"
            );
            Ok(Some(report))
        }
        Err(AcquisitionError::NotRunning) => Ok(None),
        Err(e) => Err(e).context("Live acquisition failed"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

fn build_result(
    target: u64,
    report: Option<&SessionReport>,
    images_received: u64,
    consumer: &MetricsSnapshot,
) -> SimulationResult {
    let report = report.cloned().unwrap_or_default();
    SimulationResult {
        frames_requested: target,
        frames_delivered: report.frames_delivered,
        images_received,
        overflow_events: report.overflow_events,
        missed_frames: report.missed_frames,
        timeouts: report.timeouts,
        consumer_overflows: consumer.overflow_count,
        consumer_cleared: consumer.cleared_count,
    }
}

fn print_summary(summary: &SessionSummary, consumer: &MetricsSnapshot, images_received: u64) {
    println!();
    print!("{}", summary);
    println!("Images drained by reader: {}", images_received);
    println!(
        "Consumer: inserted={}, overflowed={}, cleared={}",
        consumer.inserted_count, consumer.overflow_count, consumer.cleared_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::FrameHeader;

    #[test]
    fn test_feed_frames_drops_from_secondary() {
        let sdk = ScriptedSdk::with_sensor(2, 2);
        let target = feed_frames(&sdk, Channel::active(2), 10, 5);
        // ids 5 and 10 missing on camera 2
        assert_eq!(target, 8);
        let stride = FrameHeader::padded_stride(4);
        assert_eq!(sdk.pending_bytes(Channel::Primary), 10 * stride);
        assert_eq!(sdk.pending_bytes(Channel::Secondary), 8 * stride);
    }

    #[test]
    fn test_feed_frames_single_channel() {
        let sdk = ScriptedSdk::with_sensor(2, 2);
        assert_eq!(feed_frames(&sdk, Channel::active(1), 6, 2), 6);
        assert_eq!(sdk.pending_bytes(Channel::Secondary), 0);
    }

    fn args(frames: u64, drop_every: u64) -> SimulateArgs {
        SimulateArgs {
            config: None,
            frames,
            width: 4,
            height: 4,
            drop_every,
            interval_ms: 1,
            stop_on_overflow: false,
            metrics_port: 0,
            json: true,
        }
    }

    #[test]
    fn test_zero_frame_target_rejected() {
        assert!(check_frame_target(&args(0, 0), 2).is_err());
        assert!(check_frame_target(&args(10, 1), 2).is_err());
        assert!(check_frame_target(&args(10, 1), 1).is_ok());
        assert!(check_frame_target(&args(1, 0), 2).is_ok());
        // drop_every 2 still leaves odd ids on camera 2
        assert_eq!(feed_frames(&ScriptedSdk::with_sensor(2, 2), Channel::active(2), 3, 2), 2);
    }

    #[tokio::test]
    async fn test_simulate_rejects_empty_session() {
        let err = run_simulate(&args(0, 0)).await.unwrap_err();
        assert!(err.to_string().contains("--frames"));

        let err = run_simulate(&args(5, 1)).await.unwrap_err();
        assert!(err.to_string().contains("--drop-every"));
    }

    #[test]
    fn test_default_config_is_simulated_pair() {
        let args = SimulateArgs {
            config: None,
            frames: 1,
            width: 2,
            height: 2,
            drop_every: 0,
            interval_ms: 1,
            stop_on_overflow: false,
            metrics_port: 0,
            json: true,
        };
        let config = load_config(&args).unwrap();
        assert!(config.cameras.is_dual());
        assert!(config.cameras.selection_error().is_none());
    }

    #[tokio::test]
    async fn test_simulate_end_to_end() {
        let args = SimulateArgs {
            config: None,
            frames: 12,
            width: 4,
            height: 4,
            drop_every: 0,
            interval_ms: 1,
            stop_on_overflow: false,
            metrics_port: 0,
            json: true,
        };
        run_simulate(&args).await.unwrap();
    }
}
