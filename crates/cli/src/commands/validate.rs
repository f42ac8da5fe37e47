//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DeliveryMode, DeviceConfig};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    cameras: Vec<String>,
    delivery: DeliveryMode,
    poll_budget_ms: u128,
    consumer_capacity: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let mut cameras = vec![config.cameras.primary.clone()];
            if config.cameras.is_dual() {
                cameras.push(config.cameras.secondary.clone());
            }

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    cameras,
                    delivery: config.delivery,
                    poll_budget_ms: config.retry.budget().as_millis(),
                    consumer_capacity: config.consumer_capacity,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &DeviceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.delivery == DeliveryMode::SingleChannel && !config.cameras.is_dual() {
        warnings.push("single_channel delivery has no effect with one camera".to_string());
    }

    if config.retry.budget() > Duration::from_secs(10) {
        warnings.push(format!(
            "poll budget of {:.1}s may stall live acquisition",
            config.retry.budget().as_secs_f64()
        ));
    }

    if config.consumer_capacity < 4 {
        warnings.push(format!(
            "consumer capacity {} is likely to overflow during live acquisition",
            config.consumer_capacity
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Cameras: {}", summary.cameras.join(", "));
            println!("  Delivery: {:?}", summary.delivery);
            println!("  Poll budget: {} ms", summary.poll_budget_ms);
            println!("  Consumer capacity: {}", summary.consumer_capacity);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
