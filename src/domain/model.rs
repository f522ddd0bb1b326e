use chrono::{DateTime, Local};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 相機拍下的一張影像
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub path: PathBuf,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            captured_at: Local::now(),
        }
    }

    /// 檔名（不含副檔名），作為各階段輸出影像的前綴
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.captured_at.format("%Y-%m-%d_%H-%M-%S").to_string())
    }
}

/// 偵測流程每一步的影像
#[derive(Debug, Clone)]
pub struct StageImages {
    pub original: RgbImage,
    pub denoise: RgbImage,
    pub difference: RgbImage,
    pub grayscale: GrayImage,
    pub threshold: GrayImage,
    pub morph: GrayImage,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub frame: Frame,
    pub coverage_ratio: f64,
    pub threshold_level: u8,
    pub stages: Option<StageImages>,
}

impl Detection {
    pub fn coverage_percent(&self) -> f64 {
        round_percent(self.coverage_ratio)
    }
}

/// 掃描紀錄，寫入 scans.csv 的一列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub timestamp: DateTime<Local>,
    pub image: String,
    pub coverage_ratio: f64,
    pub coverage_percent: f64,
    pub threshold_percent: f64,
    pub alarm: bool,
}

impl ScanRecord {
    pub fn from_detection(detection: &Detection, threshold_percent: f64, alarm: bool) -> Self {
        Self {
            timestamp: detection.frame.captured_at,
            image: detection.frame.path.display().to_string(),
            coverage_ratio: detection.coverage_ratio,
            coverage_percent: detection.coverage_percent(),
            threshold_percent,
            alarm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub record: ScanRecord,
    pub alarm_triggered: bool,
}

/// 比例轉百分比，保留兩位小數
pub fn round_percent(ratio: f64) -> f64 {
    (ratio * 100.0 * 100.0).round() / 100.0
}
