//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate ranges and cross-field rules
//! - Produce a `DeviceConfig` for the device adapter
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("dualcam.toml")).unwrap();
//! println!("Camera 1: {}", config.cameras.primary);
//! ```

mod parser;
mod validator;

pub use contracts::DeviceConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<DeviceConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<DeviceConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Validate an already constructed configuration
    pub fn validate(config: &DeviceConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize DeviceConfig to TOML string
    pub fn to_toml(config: &DeviceConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize DeviceConfig to JSON string
    pub fn to_json(config: &DeviceConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DUAL_TOML: &str = r#"
exposure_ms = 30.0

[cameras]
primary = "simulated: radial sin"
secondary = "simulated: radial cos"

[retry]
interval_ms = 5
max_retries = 200
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(DUAL_TOML, ConfigFormat::Toml).unwrap();
        assert!(config.cameras.is_dual());
        assert_eq!(config.retry.max_retries, 200);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(DUAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let back = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[cameras]
primary = "cam-a"
secondary = "cam-a"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(DUAL_TOML.as_bytes()).unwrap();

        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.exposure_ms, 30.0);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/dualcam.toml")).unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
