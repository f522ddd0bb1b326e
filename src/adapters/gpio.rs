//! GPIO outputs (LED, buzzer) and the reset button.
//!
//! The real backend drives pins through the Linux sysfs interface
//! (`/sys/class/gpio`). The simulated backend keeps state in memory and is
//! what the tests and `--simulate` runs use.

use crate::domain::ports::{Button, Indicator};
use crate::utils::error::{Result, WatcherError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SYSFS_BASE: &str = "/sys/class/gpio";

const EXPORT_RETRIES: u32 = 10;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Debug)]
struct SysfsPin {
    pin: u32,
    dir: PathBuf,
}

impl SysfsPin {
    fn export(base: &Path, pin: u32, direction: Direction) -> Result<Self> {
        let dir = base.join(format!("gpio{}", pin));
        if !dir.exists() {
            std::fs::write(base.join("export"), pin.to_string())
                .map_err(|e| WatcherError::gpio(pin, format!("export failed: {}", e)))?;
        }

        // udev 需要一點時間才會建立 gpioN 並調整權限
        let mut attempt = 0;
        loop {
            match std::fs::write(dir.join("direction"), direction.as_str()) {
                Ok(()) => break,
                Err(e) if attempt + 1 >= EXPORT_RETRIES => {
                    return Err(WatcherError::gpio(
                        pin,
                        format!("cannot set direction '{}': {}", direction.as_str(), e),
                    ));
                }
                Err(_) => {
                    attempt += 1;
                    std::thread::sleep(EXPORT_RETRY_DELAY);
                }
            }
        }

        tracing::debug!("GPIO {} exported as {}", pin, direction.as_str());
        Ok(Self { pin, dir })
    }

    fn write_level(&self, high: bool) -> Result<()> {
        std::fs::write(self.dir.join("value"), if high { "1" } else { "0" })
            .map_err(|e| WatcherError::gpio(self.pin, format!("write failed: {}", e)))
    }

    async fn read_level(&self) -> Result<bool> {
        let raw = tokio::fs::read_to_string(self.dir.join("value"))
            .await
            .map_err(|e| WatcherError::gpio(self.pin, format!("read failed: {}", e)))?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(WatcherError::gpio(
                self.pin,
                format!("unexpected value '{}'", other),
            )),
        }
    }
}

#[derive(Debug)]
pub struct SysfsOutput {
    pin: SysfsPin,
    state: bool,
}

impl SysfsOutput {
    pub fn new(base: &Path, pin: u32) -> Result<Self> {
        let pin = SysfsPin::export(base, pin, Direction::Out)?;
        pin.write_level(false)?;
        Ok(Self { pin, state: false })
    }
}

/// 程式結束時腳位拉低，避免蜂鳴器持續作響
impl Drop for SysfsOutput {
    fn drop(&mut self) {
        if let Err(e) = self.pin.write_level(false) {
            tracing::warn!("Failed to drive GPIO {} low on exit: {}", self.pin.pin, e);
        }
    }
}

impl Indicator for SysfsOutput {
    fn on(&mut self) -> Result<()> {
        self.pin.write_level(true)?;
        self.state = true;
        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        self.pin.write_level(false)?;
        self.state = false;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.state
    }
}

/// 按鈕輸入，預設低電位觸發（接上拉電阻）
#[derive(Debug)]
pub struct SysfsInput {
    pin: SysfsPin,
    active_low: bool,
}

impl SysfsInput {
    pub fn new(base: &Path, pin: u32, active_low: bool) -> Result<Self> {
        let pin = SysfsPin::export(base, pin, Direction::In)?;
        Ok(Self { pin, active_low })
    }
}

#[async_trait]
impl Button for SysfsInput {
    async fn is_pressed(&self) -> Result<bool> {
        let level = self.pin.read_level().await?;
        Ok(level != self.active_low)
    }
}

/// 記憶體中的指示燈，clone 之後共用狀態
#[derive(Debug, Clone)]
pub struct SimulatedIndicator {
    name: String,
    state: Arc<AtomicBool>,
    switches: Arc<AtomicUsize>,
}

impl SimulatedIndicator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(AtomicBool::new(false)),
            switches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 狀態實際改變的次數
    pub fn switch_count(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    fn set(&self, on: bool) {
        if self.state.swap(on, Ordering::SeqCst) != on {
            self.switches.fetch_add(1, Ordering::SeqCst);
            tracing::info!("💡 [simulated] {} {}", self.name, if on { "on" } else { "off" });
        }
    }
}

impl Indicator for SimulatedIndicator {
    fn on(&mut self) -> Result<()> {
        self.set(true);
        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        self.set(false);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}

/// 記憶體中的按鈕：`press()` 之後下一次讀取回報按下
#[derive(Debug, Clone, Default)]
pub struct SimulatedButton {
    pressed: Arc<AtomicBool>,
}

impl SimulatedButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.pressed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Button for SimulatedButton {
    async fn is_pressed(&self) -> Result<bool> {
        Ok(self.pressed.swap(false, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// 建立假的 sysfs 目錄結構
    fn fake_sysfs(pins: &[u32]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for pin in pins {
            let pin_dir = dir.path().join(format!("gpio{}", pin));
            std::fs::create_dir_all(&pin_dir).unwrap();
            std::fs::write(pin_dir.join("value"), "0").unwrap();
        }
        dir
    }

    #[test]
    fn test_sysfs_output_writes_value() {
        let sysfs = fake_sysfs(&[17]);
        let mut led = SysfsOutput::new(sysfs.path(), 17).unwrap();

        assert_eq!(
            std::fs::read_to_string(sysfs.path().join("gpio17/direction")).unwrap(),
            "out"
        );
        led.on().unwrap();
        assert!(led.is_on());
        assert_eq!(std::fs::read_to_string(sysfs.path().join("gpio17/value")).unwrap(), "1");
        led.off().unwrap();
        assert_eq!(std::fs::read_to_string(sysfs.path().join("gpio17/value")).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_sysfs_input_active_low() {
        let sysfs = fake_sysfs(&[22]);
        let button = SysfsInput::new(sysfs.path(), 22, true).unwrap();

        std::fs::write(sysfs.path().join("gpio22/value"), "1\n").unwrap();
        assert!(!button.is_pressed().await.unwrap());
        std::fs::write(sysfs.path().join("gpio22/value"), "0\n").unwrap();
        assert!(button.is_pressed().await.unwrap());
    }

    #[tokio::test]
    async fn test_sysfs_input_active_high() {
        let sysfs = fake_sysfs(&[5]);
        let button = SysfsInput::new(sysfs.path(), 5, false).unwrap();
        std::fs::write(sysfs.path().join("gpio5/value"), "1").unwrap();
        assert!(button.is_pressed().await.unwrap());
    }

    #[test]
    fn test_sysfs_output_drives_low_on_drop() {
        let sysfs = fake_sysfs(&[27]);
        let mut buzzer = SysfsOutput::new(sysfs.path(), 27).unwrap();
        buzzer.on().unwrap();
        assert_eq!(std::fs::read_to_string(sysfs.path().join("gpio27/value")).unwrap(), "1");

        drop(buzzer);
        assert_eq!(std::fs::read_to_string(sysfs.path().join("gpio27/value")).unwrap(), "0");
    }

    #[test]
    fn test_sysfs_missing_pin_fails() {
        let sysfs = TempDir::new().unwrap();
        // export 會寫入一般檔案，但 gpio9 目錄永遠不會出現
        let err = SysfsOutput::new(sysfs.path(), 9).unwrap_err();
        assert!(matches!(err, WatcherError::GpioError { pin: 9, .. }));
    }

    /// 需要真實的樹莓派：`cargo test -- --ignored`
    #[test]
    #[ignore]
    fn test_real_sysfs_led_blink() {
        let pin = std::env::var("SAWDUST_TEST_LED_PIN")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(17);
        let mut led = SysfsOutput::new(Path::new(DEFAULT_SYSFS_BASE), pin).unwrap();
        led.on().unwrap();
        std::thread::sleep(Duration::from_millis(500));
        led.off().unwrap();
        assert!(!led.is_on());
    }

    #[test]
    fn test_simulated_indicator_shares_state() {
        let led = SimulatedIndicator::new("led");
        let mut handle = led.clone();

        handle.on().unwrap();
        handle.on().unwrap();
        assert!(led.is_on());
        handle.off().unwrap();
        assert!(!led.is_on());
        assert_eq!(led.switch_count(), 2);
    }

    #[tokio::test]
    async fn test_simulated_button_is_one_shot() {
        let button = SimulatedButton::new();
        assert!(!button.is_pressed().await.unwrap());
        button.press();
        assert!(button.is_pressed().await.unwrap());
        assert!(!button.is_pressed().await.unwrap());
    }
}
