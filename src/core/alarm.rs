use crate::domain::ports::Indicator;
use crate::utils::error::Result;
use std::time::Duration;

pub const FLASH_ON: Duration = Duration::from_millis(500);
pub const FLASH_OFF: Duration = Duration::from_millis(500);

/// LED 與蜂鳴器組成的警報，觸發後保持直到重置
pub struct Alarm {
    led: Box<dyn Indicator>,
    buzzer: Box<dyn Indicator>,
    active: bool,
}

impl Alarm {
    pub fn new(led: Box<dyn Indicator>, buzzer: Box<dyn Indicator>) -> Self {
        Self {
            led,
            buzzer,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 回傳是否為新觸發
    pub fn trigger(&mut self) -> Result<bool> {
        if self.active {
            return Ok(false);
        }
        self.led.on()?;
        self.buzzer.on()?;
        self.active = true;
        Ok(true)
    }

    /// 回傳重置前是否處於警報狀態
    pub fn reset(&mut self) -> Result<bool> {
        let was_active = self.active;
        self.buzzer.off()?;
        self.led.off()?;
        self.active = false;
        Ok(was_active)
    }

    /// 關閉所有輸出，兩個都嘗試過才回報錯誤
    pub fn silence(&mut self) -> Result<()> {
        let buzzer = self.buzzer.off();
        let led = self.led.off();
        self.active = false;
        buzzer.and(led)
    }

    /// 掃描時閃一下 LED；警報中不動作
    pub async fn flash_led(&mut self, on_time: Duration, off_time: Duration) -> Result<()> {
        if self.active {
            return Ok(());
        }
        self.led.on()?;
        tokio::time::sleep(on_time).await;
        self.led.off()?;
        tokio::time::sleep(off_time).await;
        Ok(())
    }
}
