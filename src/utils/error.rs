use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Camera error: {message}")]
    CameraError { message: String },

    #[error("GPIO error on pin {pin}: {message}")]
    GpioError { pin: u32, message: String },

    #[error("Detection error: {message}")]
    DetectionError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Hardware,
    Processing,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl WatcherError {
    pub fn camera(message: impl Into<String>) -> Self {
        Self::CameraError {
            message: message.into(),
        }
    }

    pub fn detection(message: impl Into<String>) -> Self {
        Self::DetectionError {
            message: message.into(),
        }
    }

    pub fn gpio(pin: u32, message: impl Into<String>) -> Self {
        Self::GpioError {
            pin,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::CameraError { .. } | Self::GpioError { .. } => ErrorCategory::Hardware,
            Self::ImageError(_) | Self::DetectionError { .. } => ErrorCategory::Processing,
            Self::IoError(_) | Self::CsvError(_) | Self::SerializationError(_) => {
                ErrorCategory::Storage
            }
        }
    }

    /// 錯誤嚴重程度，決定監控迴圈是否可以繼續
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 相機偶爾失敗是可預期的，下一輪掃描再試
            Self::CameraError { .. } => ErrorSeverity::Medium,
            Self::ImageError(_) | Self::DetectionError { .. } => ErrorSeverity::Medium,
            Self::CsvError(_) | Self::SerializationError(_) => ErrorSeverity::Low,
            Self::IoError(_) => ErrorSeverity::High,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::High,
            Self::GpioError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::IoError(_) => {
                "Check that the output directory exists and is writable".to_string()
            }
            Self::ImageError(_) => {
                "Check that the captured file is a valid PNG or JPEG image".to_string()
            }
            Self::CsvError(_) | Self::SerializationError(_) => {
                "Check the scan history file; remove it if it was edited by hand".to_string()
            }
            Self::ConfigError { .. } | Self::ConfigValidationError { .. } => {
                "Check the TOML syntax of the configuration file".to_string()
            }
            Self::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' in the configuration file", field)
            }
            Self::MissingConfigError { field } => {
                format!("Add '{}' to the configuration file", field)
            }
            Self::CameraError { .. } => {
                "Check the camera cable and that the capture command works from a shell"
                    .to_string()
            }
            Self::GpioError { pin, .. } => format!(
                "Check that GPIO {} is free and the process may access /sys/class/gpio",
                pin
            ),
            Self::DetectionError { .. } => {
                "Check the [detection] parameters in the configuration file".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Hardware => format!("Hardware problem: {}", self),
            ErrorCategory::Processing => format!("Image processing failed: {}", self),
            ErrorCategory::Storage => format!("Could not save results: {}", self),
        }
    }

    /// 程式結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, WatcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_severity() {
        let err = WatcherError::camera("no frame");
        assert_eq!(err.category(), ErrorCategory::Hardware);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.exit_code(), 2);

        let err = WatcherError::gpio(17, "busy");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.recovery_suggestion().contains("GPIO 17"));
    }

    #[test]
    fn test_user_friendly_message() {
        let err = WatcherError::MissingConfigError {
            field: "gpio.led".to_string(),
        };
        assert!(err.user_friendly_message().starts_with("Configuration problem"));
        assert!(err.recovery_suggestion().contains("gpio.led"));
    }
}
