//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DeliveryMode, DeviceConfig, SampleType};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    cameras: CameraInfo,
    delivery: DeliveryMode,
    retry: RetryInfo,
    exposure_ms: f64,
    pixel_type: SampleType,
    bit_depth: u32,
    binning: u8,
    consumer_capacity: usize,
}

#[derive(Serialize)]
struct CameraInfo {
    primary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary: Option<String>,
    channel_count: usize,
}

#[derive(Serialize)]
struct RetryInfo {
    interval_ms: u64,
    max_retries: u32,
    budget_ms: u128,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&build_config_info(&config))
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &DeviceConfig) -> ConfigInfo {
    ConfigInfo {
        cameras: CameraInfo {
            primary: config.cameras.primary.clone(),
            secondary: config
                .cameras
                .is_dual()
                .then(|| config.cameras.secondary.clone()),
            channel_count: config.cameras.channel_count(),
        },
        delivery: config.delivery,
        retry: RetryInfo {
            interval_ms: config.retry.interval_ms,
            max_retries: config.retry.max_retries,
            budget_ms: config.retry.budget().as_millis(),
        },
        exposure_ms: config.exposure_ms,
        pixel_type: config.pixel_type,
        bit_depth: config.pixel_type.bytes_per_pixel() * 8,
        binning: config.binning,
        consumer_capacity: config.consumer_capacity,
    }
}

fn print_config_info(config: &DeviceConfig) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               dualcam Device Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📷 Cameras ({})", config.cameras.channel_count());
    if config.cameras.is_dual() {
        println!("   ├─ Camera 1: {}", config.cameras.primary);
        println!("   └─ Camera 2: {}", config.cameras.secondary);
    } else {
        println!("   └─ Camera 1: {}", config.cameras.primary);
    }

    println!("\n⚙️  Acquisition");
    println!("   ├─ Delivery: {:?}", config.delivery);
    println!("   ├─ Exposure: {} ms", config.exposure_ms);
    println!(
        "   ├─ Pixel type: {:?} ({} bit)",
        config.pixel_type,
        config.pixel_type.bytes_per_pixel() * 8
    );
    println!("   └─ Binning: {}", config.binning);

    println!("\n🔁 Stream polling");
    println!("   ├─ Interval: {} ms", config.retry.interval_ms);
    println!("   ├─ Max retries: {}", config.retry.max_retries);
    println!("   └─ Budget: {} ms", config.retry.budget().as_millis());

    println!("\n📤 Consumer");
    println!("   └─ Capacity: {} images", config.consumer_capacity);

    println!();
}
