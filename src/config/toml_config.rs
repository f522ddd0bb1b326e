use crate::adapters::camera::OUTPUT_PLACEHOLDER;
use crate::adapters::gpio::DEFAULT_SYSFS_BASE;
use crate::core::detection::{DetectionParams, ThresholdMode};
use crate::core::watcher::WatchSettings;
use crate::utils::error::{Result, WatcherError};
use crate::utils::logger::LogFormat;
use crate::utils::validation::{
    validate_non_empty_string, validate_odd_kernel, validate_path, validate_positive_number,
    validate_range, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub gpio: GpioConfig,
    pub op: OpConfig,
    pub detection: Option<DetectionConfig>,
    pub camera: Option<CameraConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    #[default]
    Sysfs,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioConfig {
    pub backend: Option<GpioBackend>,
    pub led: u32,
    pub buzzer: u32,
    pub button: u32,
    pub button_active_low: Option<bool>,
    pub sysfs_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpConfig {
    /// 掃描間隔（秒）
    pub scan_interval: u64,
    pub coverage_threshold_percent: f64,
    pub poll_interval_ms: Option<u64>,
    pub flash_on_scan: Option<bool>,
    pub max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdModeName {
    #[default]
    Fixed,
    Otsu,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub noise_size: Option<u32>,
    pub threshold_mode: Option<ThresholdModeName>,
    pub threshold: Option<u8>,
    pub morph_size: Option<u32>,
    pub morph_iterations: Option<u32>,
    pub scale: Option<f64>,
    pub save_stages: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    #[default]
    Command,
    Directory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfig {
    pub backend: Option<CameraBackend>,
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_format: Option<LogFormat>,
}

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
pub const DEFAULT_CAMERA_PROGRAM: &str = "rpicam-still";
pub const DEFAULT_CAMERA_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_SCALE: f64 = 0.25;

pub fn default_camera_args() -> Vec<String> {
    [
        "--nopreview",
        "--timeout",
        "5000",
        "--encoding",
        "png",
        "--output",
        OUTPUT_PLACEHOLDER,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl WatcherConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| WatcherError::ConfigError {
            message: format!("Cannot read '{}': {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| WatcherError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GPIO_LED})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| WatcherError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_positive_number("op.scan_interval", self.op.scan_interval, 1)?;
        validate_range(
            "op.coverage_threshold_percent",
            self.op.coverage_threshold_percent,
            0.0,
            100.0,
        )?;
        if let Some(poll) = self.op.poll_interval_ms {
            validate_positive_number("op.poll_interval_ms", poll, 1)?;
        }
        if let Some(max) = self.op.max_consecutive_failures {
            validate_positive_number("op.max_consecutive_failures", max as u64, 1)?;
        }

        // 同一支腳位不能兼任兩種用途
        let pins = [
            ("gpio.led", self.gpio.led),
            ("gpio.buzzer", self.gpio.buzzer),
            ("gpio.button", self.gpio.button),
        ];
        for (i, (field, pin)) in pins.iter().enumerate() {
            if pins[..i].iter().any(|(_, other)| other == pin) {
                return Err(WatcherError::InvalidConfigValueError {
                    field: field.to_string(),
                    value: pin.to_string(),
                    reason: "Pin is already assigned to another device".to_string(),
                });
            }
        }
        if let Some(base) = &self.gpio.sysfs_base {
            validate_path("gpio.sysfs_base", base)?;
        }

        if let Some(detection) = &self.detection {
            if let Some(noise) = detection.noise_size {
                validate_odd_kernel("detection.noise_size", noise)?;
            }
            if let Some(morph) = detection.morph_size {
                validate_odd_kernel("detection.morph_size", morph)?;
            }
            if detection.threshold_mode == Some(ThresholdModeName::Otsu)
                && detection.threshold.is_some()
            {
                tracing::warn!("detection.threshold is ignored when threshold_mode = \"otsu\"");
            }
        }
        self.detection_params().validate()?;

        match self.camera_backend() {
            CameraBackend::Command => {
                validate_non_empty_string("camera.program", &self.camera_program())?;
                if !self
                    .camera_args()
                    .iter()
                    .any(|arg| arg.contains(OUTPUT_PLACEHOLDER))
                {
                    return Err(WatcherError::InvalidConfigValueError {
                        field: "camera.args".to_string(),
                        value: self.camera_args().join(" "),
                        reason: format!("Arguments must contain the {} placeholder", OUTPUT_PLACEHOLDER),
                    });
                }
                validate_positive_number("camera.timeout_seconds", self.camera_timeout().as_secs(), 1)?;
            }
            CameraBackend::Directory => {
                let directory = crate::utils::validation::validate_required_field(
                    "camera.directory",
                    &self.camera.as_ref().and_then(|c| c.directory.clone()),
                )?
                .clone();
                validate_path("camera.directory", &directory)?;
            }
        }

        Ok(())
    }

    pub fn gpio_backend(&self) -> GpioBackend {
        self.gpio.backend.unwrap_or_default()
    }

    pub fn sysfs_base(&self) -> PathBuf {
        PathBuf::from(
            self.gpio
                .sysfs_base
                .as_deref()
                .unwrap_or(DEFAULT_SYSFS_BASE),
        )
    }

    pub fn button_active_low(&self) -> bool {
        self.gpio.button_active_low.unwrap_or(true)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.op.scan_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.op.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            scan_interval: self.scan_interval(),
            poll_interval: self.poll_interval(),
            coverage_threshold_percent: self.op.coverage_threshold_percent,
            flash_on_scan: self.op.flash_on_scan.unwrap_or(false),
            max_consecutive_failures: self
                .op
                .max_consecutive_failures
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
        }
    }

    /// 未設定的偵測參數使用預設值
    pub fn detection_params(&self) -> DetectionParams {
        let defaults = DetectionParams::default();
        let section = self.detection.clone().unwrap_or_default();

        let threshold = match section.threshold_mode.unwrap_or_default() {
            ThresholdModeName::Fixed => ThresholdMode::Fixed(section.threshold.unwrap_or(32)),
            ThresholdModeName::Otsu => ThresholdMode::Otsu,
        };

        DetectionParams {
            noise_size: section.noise_size.unwrap_or(defaults.noise_size),
            threshold,
            morph_size: section.morph_size.unwrap_or(defaults.morph_size),
            morph_iterations: section.morph_iterations.unwrap_or(defaults.morph_iterations),
            scale: section.scale.unwrap_or(DEFAULT_SCALE),
        }
    }

    pub fn save_stages(&self) -> bool {
        self.detection
            .as_ref()
            .and_then(|d| d.save_stages)
            .unwrap_or(false)
    }

    pub fn camera_backend(&self) -> CameraBackend {
        self.camera
            .as_ref()
            .and_then(|c| c.backend)
            .unwrap_or_default()
    }

    pub fn camera_program(&self) -> String {
        self.camera
            .as_ref()
            .and_then(|c| c.program.clone())
            .unwrap_or_else(|| DEFAULT_CAMERA_PROGRAM.to_string())
    }

    pub fn camera_args(&self) -> Vec<String> {
        self.camera
            .as_ref()
            .and_then(|c| c.args.clone())
            .unwrap_or_else(default_camera_args)
    }

    pub fn camera_timeout(&self) -> Duration {
        Duration::from_secs(
            self.camera
                .as_ref()
                .and_then(|c| c.timeout_seconds)
                .unwrap_or(DEFAULT_CAMERA_TIMEOUT_SECONDS),
        )
    }

    pub fn camera_directory(&self) -> Option<PathBuf> {
        self.camera
            .as_ref()
            .and_then(|c| c.directory.as_deref())
            .map(crate::utils::validation::expand_home)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn set_monitoring(&mut self, enabled: bool) {
        self.monitoring.get_or_insert_with(MonitoringConfig::default).enabled = enabled;
    }

    pub fn log_format(&self) -> LogFormat {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_format)
            .unwrap_or_default()
    }
}

impl Validate for WatcherConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
