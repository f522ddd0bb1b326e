use crate::utils::error::{Result, WatcherError};
use std::path::{Path, PathBuf};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub const MAX_KERNEL_SIZE: u32 = 255;

/// 卷積核大小必須是不超過 `MAX_KERNEL_SIZE` 的正奇數
pub fn validate_odd_kernel(field_name: &str, value: u32) -> Result<()> {
    if value == 0 || value % 2 == 0 {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Kernel size must be a positive odd number".to_string(),
        });
    }
    if value > MAX_KERNEL_SIZE {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Kernel size must not exceed {}", MAX_KERNEL_SIZE),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| WatcherError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    // NaN 不在任何範圍內
    if !(value >= min && value <= max) {
        return Err(WatcherError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 展開開頭的 `~` 為使用者家目錄
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let rest = path.trim_start_matches('~').trim_start_matches('/');
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("op.scan_interval", 5, 1).is_ok());
        assert!(validate_positive_number("op.scan_interval", 0, 1).is_err());
    }

    #[test]
    fn test_validate_odd_kernel() {
        assert!(validate_odd_kernel("detection.noise_size", 11).is_ok());
        assert!(validate_odd_kernel("detection.noise_size", 1).is_ok());
        assert!(validate_odd_kernel("detection.noise_size", 4).is_err());
        assert!(validate_odd_kernel("detection.noise_size", 0).is_err());
        assert!(validate_odd_kernel("detection.noise_size", MAX_KERNEL_SIZE).is_ok());
        assert!(validate_odd_kernel("detection.noise_size", 257).is_err());
        assert!(validate_odd_kernel("detection.morph_size", 131_073).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("op.coverage_threshold_percent", 12.5, 0.0, 100.0).is_ok());
        assert!(validate_range("op.coverage_threshold_percent", 100.1, 0.0, 100.0).is_err());
        assert!(validate_range("op.coverage_threshold_percent", f64::NAN, 0.0, 100.0).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("camera.directory", "./frames").is_ok());
        assert!(validate_path("camera.directory", "").is_err());
        assert!(validate_path("camera.directory", "a\0b").is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/log"), PathBuf::from("/var/log"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/watcher"), Path::new(&home).join("watcher"));
        }
    }
}
