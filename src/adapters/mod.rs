// Adapters layer: concrete implementations for external systems (camera, GPIO, filesystem).

pub mod camera;
pub mod gpio;
pub mod history;
pub mod storage;

use crate::config::toml_config::{CameraBackend, GpioBackend, WatcherConfig};
use crate::domain::ports::{Button, Camera, Indicator};
use crate::utils::error::{Result, WatcherError};
use camera::{CommandCamera, DirectoryCamera};
use gpio::{SimulatedButton, SimulatedIndicator, SysfsInput, SysfsOutput};

/// LED、蜂鳴器與重置按鈕
pub struct Panel {
    pub led: Box<dyn Indicator>,
    pub buzzer: Box<dyn Indicator>,
    pub button: Box<dyn Button>,
}

pub fn camera_from_config(config: &WatcherConfig) -> Result<Box<dyn Camera>> {
    match config.camera_backend() {
        CameraBackend::Command => Ok(Box::new(CommandCamera::new(
            config.camera_program(),
            config.camera_args(),
            config.camera_timeout(),
        ))),
        CameraBackend::Directory => {
            let directory =
                config
                    .camera_directory()
                    .ok_or_else(|| WatcherError::MissingConfigError {
                        field: "camera.directory".to_string(),
                    })?;
            Ok(Box::new(DirectoryCamera::new(directory)))
        }
    }
}

pub fn panel_from_config(config: &WatcherConfig) -> Result<Panel> {
    match config.gpio_backend() {
        GpioBackend::Sysfs => {
            let base = config.sysfs_base();
            tracing::info!(
                "Using sysfs GPIO at {} (LED {}, buzzer {}, button {})",
                base.display(),
                config.gpio.led,
                config.gpio.buzzer,
                config.gpio.button
            );
            Ok(Panel {
                led: Box::new(SysfsOutput::new(&base, config.gpio.led)?),
                buzzer: Box::new(SysfsOutput::new(&base, config.gpio.buzzer)?),
                button: Box::new(SysfsInput::new(
                    &base,
                    config.gpio.button,
                    config.button_active_low(),
                )?),
            })
        }
        GpioBackend::Simulated => {
            tracing::info!("Using simulated GPIO");
            Ok(Panel {
                led: Box::new(SimulatedIndicator::new(format!("LED (GPIO {})", config.gpio.led))),
                buzzer: Box::new(SimulatedIndicator::new(format!(
                    "buzzer (GPIO {})",
                    config.gpio.buzzer
                ))),
                button: Box::new(SimulatedButton::new()),
            })
        }
    }
}
