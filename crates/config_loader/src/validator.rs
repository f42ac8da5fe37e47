//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (`validator` derive)
//! - 相机选择合法 (camera 1 必选、两路不同、不混用模拟与物理相机)
//! - binning 属于 {1, 2, 4}

use contracts::{ContractError, DeviceConfig, ALLOWED_BINNING};
use validator::Validate;

/// 校验 DeviceConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &DeviceConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_cameras(config)?;
    validate_binning(config)?;
    Ok(())
}

/// 字段范围校验
fn validate_ranges(config: &DeviceConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let mut fields: Vec<_> = errors.errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        ContractError::config_validation(fields.join(", "), errors.to_string())
    })
}

/// 相机选择校验
fn validate_cameras(config: &DeviceConfig) -> Result<(), ContractError> {
    match config.cameras.selection_error() {
        Some(message) => Err(ContractError::config_validation("cameras", message)),
        None => Ok(()),
    }
}

/// binning 校验
fn validate_binning(config: &DeviceConfig) -> Result<(), ContractError> {
    if !ALLOWED_BINNING.contains(&config.binning) {
        return Err(ContractError::config_validation(
            "binning",
            format!(
                "binning must be one of {:?}, got {}",
                ALLOWED_BINNING, config.binning
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CameraConfig, CAMERA_NONE};

    fn config() -> DeviceConfig {
        DeviceConfig::new(CameraConfig::dual("cam-a", "cam-b"))
    }

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&config()).is_ok());
        assert!(validate(&DeviceConfig::new(CameraConfig::single("cam-a"))).is_ok());
    }

    #[test]
    fn test_identical_cameras_rejected() {
        let mut config = config();
        config.cameras.secondary = "cam-a".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("must differ"));
        assert_eq!(field_of(err), "cameras");
    }

    #[test]
    fn test_missing_primary_rejected() {
        let config = DeviceConfig::new(CameraConfig::dual(CAMERA_NONE, "cam-b"));
        assert_eq!(field_of(validate(&config).unwrap_err()), "cameras");
    }

    #[test]
    fn test_mixed_simulated_rejected() {
        let config = DeviceConfig::new(CameraConfig::dual("simulated: radial sin", "cam-b"));
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("cannot be mixed"));
    }

    #[test]
    fn test_invalid_binning() {
        let mut config = config();
        config.binning = 3;
        assert_eq!(field_of(validate(&config).unwrap_err()), "binning");
    }

    #[test]
    fn test_range_errors_name_the_field() {
        let mut config = config();
        config.consumer_capacity = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "consumer_capacity");
    }
}
