use std::time::Duration;
#[cfg(feature = "cli")]
use std::time::Instant;
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ScanStats {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub memory_percent: f32,
    pub peak_memory_mb: u64,
    pub scans: u32,
    pub last_scan: Duration,
    pub slowest_scan: Duration,
    pub uptime: Duration,
}

#[cfg(feature = "cli")]
impl ScanStats {
    pub fn average_scan(&self, total: Duration) -> Duration {
        if self.scans == 0 {
            Duration::ZERO
        } else {
            total / self.scans
        }
    }
}

/// 監控每次掃描的耗時與本程式的 CPU、記憶體（樹莓派資源有限）
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Option<System>,
    pid: Option<Pid>,
    started: Instant,
    peak_memory_mb: u64,
    scans: u32,
    total_scan_time: Duration,
    last_scan: Duration,
    slowest_scan: Duration,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            sysinfo::get_current_pid()
                .map_err(|e| tracing::warn!("System monitoring disabled, cannot read own PID: {}", e))
                .ok()
        } else {
            None
        };

        let system = pid.map(|pid| {
            let mut system = System::new();
            system.refresh_memory();
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::everything(),
            );
            system
        });

        Self {
            system,
            pid,
            started: Instant::now(),
            peak_memory_mb: 0,
            scans: 0,
            total_scan_time: Duration::ZERO,
            last_scan: Duration::ZERO,
            slowest_scan: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pid.is_some()
    }

    /// 只在啟用時累計掃描耗時
    pub fn record_scan(&mut self, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.scans += 1;
        self.total_scan_time += elapsed;
        self.last_scan = elapsed;
        self.slowest_scan = self.slowest_scan.max(elapsed);

        if let Some(stats) = self.stats() {
            tracing::info!(
                "📊 Scan #{} took {:?} - CPU: {:.1}%, Memory: {}MB ({:.1}%), Peak: {}MB",
                stats.scans,
                stats.last_scan,
                stats.cpu_usage,
                stats.memory_mb,
                stats.memory_percent,
                stats.peak_memory_mb
            );
        }
    }

    pub fn stats(&mut self) -> Option<ScanStats> {
        let pid = self.pid?;
        let system = self.system.as_mut()?;
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let total_mb = system.total_memory() / 1024 / 1024;
        let memory_percent = if total_mb > 0 {
            memory_mb as f32 / total_mb as f32 * 100.0
        } else {
            0.0
        };
        self.peak_memory_mb = self.peak_memory_mb.max(memory_mb);

        Some(ScanStats {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            memory_percent,
            peak_memory_mb: self.peak_memory_mb,
            scans: self.scans,
            last_scan: self.last_scan,
            slowest_scan: self.slowest_scan,
            uptime: self.started.elapsed(),
        })
    }

    pub fn log_final_stats(&mut self) {
        let total = self.total_scan_time;
        if let Some(stats) = self.stats() {
            tracing::info!(
                "📊 Final Stats - Uptime: {:?}, Scans: {}, Average scan: {:?}, Slowest scan: {:?}, Peak Memory: {}MB",
                stats.uptime,
                stats.scans,
                stats.average_scan(total),
                stats.slowest_scan,
                stats.peak_memory_mb
            );
        }
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 環境的空實現
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn record_scan(&mut self, _elapsed: Duration) {}

    pub fn log_final_stats(&mut self) {}
}
