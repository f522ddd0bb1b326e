use crate::core::alarm::{Alarm, FLASH_OFF, FLASH_ON};
use crate::core::{Button, ScanOutcome, ScanPipeline, ScanRecord};
use crate::utils::error::{ErrorSeverity, Result};
use crate::utils::monitor::SystemMonitor;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub scan_interval: Duration,
    pub poll_interval: Duration,
    pub coverage_threshold_percent: f64,
    pub flash_on_scan: bool,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchSummary {
    pub scans: u32,
    pub failures: u32,
    pub alarms: u32,
    pub resets: u32,
    pub last_coverage_percent: Option<f64>,
}

/// 監控主迴圈：定時掃描、判斷門檻、處理重置按鈕
pub struct WatcherEngine<P: ScanPipeline> {
    pipeline: P,
    alarm: Alarm,
    button: Box<dyn Button>,
    settings: WatchSettings,
    monitor: SystemMonitor,
    next_scan: Instant,
    consecutive_failures: u32,
    summary: WatchSummary,
}

impl<P: ScanPipeline> WatcherEngine<P> {
    pub fn new(pipeline: P, alarm: Alarm, button: Box<dyn Button>, settings: WatchSettings) -> Self {
        Self::new_with_monitoring(pipeline, alarm, button, settings, false)
    }

    pub fn new_with_monitoring(
        pipeline: P,
        alarm: Alarm,
        button: Box<dyn Button>,
        settings: WatchSettings,
        monitor_enabled: bool,
    ) -> Self {
        let next_scan = Instant::now() + settings.scan_interval;
        Self {
            pipeline,
            alarm,
            button,
            settings,
            monitor: SystemMonitor::new(monitor_enabled),
            next_scan,
            consecutive_failures: 0,
            summary: WatchSummary::default(),
        }
    }

    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }

    pub fn summary(&self) -> &WatchSummary {
        &self.summary
    }

    pub fn exceeds_threshold(&self, coverage_ratio: f64) -> bool {
        coverage_ratio >= self.settings.coverage_threshold_percent / 100.0
    }

    /// 執行一次完整掃描：拍照、分析、判斷、記錄
    pub async fn scan_once(&mut self) -> Result<ScanOutcome> {
        tracing::info!("🔍 Scanning area for sawdust");
        let started = Instant::now();

        if self.settings.flash_on_scan {
            self.alarm.flash_led(FLASH_ON, FLASH_OFF).await?;
        }

        let frame = self.pipeline.capture().await?;
        let detection = self.pipeline.analyse(frame).await?;
        let threshold = self.settings.coverage_threshold_percent;
        let exceeds = self.exceeds_threshold(detection.coverage_ratio);

        tracing::info!(
            "Sawdust detected at {:.2}% coverage",
            detection.coverage_percent()
        );

        // 先處理警報，記錄失敗不能耽誤警報
        let alarm_triggered = if exceeds {
            tracing::warn!(
                "🚨 Sawdust coverage exceeds threshold of {}%. Activating alarm",
                threshold
            );
            self.alarm.trigger()?
        } else {
            false
        };

        let record = match self.pipeline.record(&detection, threshold, exceeds).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to record scan: {}", e);
                tracing::warn!("💡 Suggestion: {}", e.recovery_suggestion());
                ScanRecord::from_detection(&detection, threshold, exceeds)
            }
        };

        self.summary.scans += 1;
        self.summary.last_coverage_percent = Some(record.coverage_percent);
        if alarm_triggered {
            self.summary.alarms += 1;
        }
        self.monitor.record_scan(started.elapsed());

        Ok(ScanOutcome {
            record,
            alarm_triggered,
        })
    }

    /// 按鈕按下時重置警報並重新計時
    pub async fn poll_button(&mut self) -> Result<bool> {
        if !self.button.is_pressed().await? {
            return Ok(false);
        }

        tracing::info!("🔘 Button pressed. Resetting alarm");
        self.alarm.reset()?;
        self.next_scan = Instant::now() + self.settings.scan_interval;
        self.summary.resets += 1;
        Ok(true)
    }

    async fn tick(&mut self) -> Result<()> {
        self.poll_button().await?;

        if self.alarm.is_active() || Instant::now() < self.next_scan {
            return Ok(());
        }

        let result = self.scan_once().await;
        // 掃描結束後才計時，慢速相機不會造成連續掃描
        self.next_scan = Instant::now() + self.settings.scan_interval;
        match result {
            Ok(_) => self.consecutive_failures = 0,
            Err(e) => {
                self.consecutive_failures += 1;
                self.summary.failures += 1;
                tracing::error!(
                    "❌ Scan failed ({} in a row): {} (Category: {:?}, Severity: {:?})",
                    self.consecutive_failures,
                    e,
                    e.category(),
                    e.severity()
                );
                tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

                if e.severity() == ErrorSeverity::Critical
                    || self.consecutive_failures >= self.settings.max_consecutive_failures
                {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// 持續監控直到 `shutdown` 完成或發生無法恢復的錯誤
    pub async fn run<F>(&mut self, shutdown: F) -> Result<WatchSummary>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "🚀 Starting sawdust watcher (scan every {:?}, threshold {}%)",
            self.settings.scan_interval,
            self.settings.coverage_threshold_percent
        );

        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested");
                    break Ok(());
                }
                _ = ticker.tick() => {
                    // 掃描進行中也要能立即停止
                    let ticked = tokio::select! {
                        biased;
                        _ = &mut shutdown => None,
                        result = self.tick() => Some(result),
                    };
                    match ticked {
                        None => {
                            tracing::info!("🛑 Shutdown requested, abandoning scan in progress");
                            break Ok(());
                        }
                        Some(Err(e)) => break Err(e),
                        Some(Ok(())) => {}
                    }
                }
            }
        };

        self.shutdown();
        result.map(|()| self.summary.clone())
    }

    /// 熄滅 LED 與蜂鳴器並輸出統計，程式結束前呼叫
    pub fn shutdown(&mut self) {
        if let Err(e) = self.alarm.silence() {
            tracing::warn!("Failed to switch off alarm outputs: {}", e);
        }
        self.monitor.log_final_stats();
    }
}
