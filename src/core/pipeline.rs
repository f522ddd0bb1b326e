use crate::adapters::history;
use crate::core::detection::{detect, encode_png, load_image, rescale_image, DetectionParams};
use crate::core::{Camera, Detection, Frame, ScanPipeline, ScanRecord, Storage};
use crate::domain::model::StageImages;
use crate::utils::error::{Result, WatcherError};
use std::path::{Path, PathBuf};

/// 拍照後分析粉塵覆蓋率的掃描流程
pub struct CameraPipeline<S: Storage> {
    storage: S,
    camera: Box<dyn Camera>,
    captures_dir: PathBuf,
    params: DetectionParams,
    save_stages: bool,
}

pub const CAPTURES_DIR: &str = "captures";

impl<S: Storage> CameraPipeline<S> {
    /// `output_root` 必須與 `storage` 的根目錄相同
    pub fn new(
        storage: S,
        camera: Box<dyn Camera>,
        output_root: &Path,
        params: DetectionParams,
        save_stages: bool,
    ) -> Self {
        Self {
            storage,
            camera,
            captures_dir: output_root.join(CAPTURES_DIR),
            params,
            save_stages,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    async fn write_stages(&self, frame: &Frame, stages: &StageImages) -> Result<()> {
        let stem = frame.stem();
        let encoded = [
            ("original", encode_png(&stages.original)?),
            ("denoise", encode_png(&stages.denoise)?),
            ("difference", encode_png(&stages.difference)?),
            ("grayscale", encode_png(&stages.grayscale)?),
            ("threshold", encode_png(&stages.threshold)?),
            ("morph", encode_png(&stages.morph)?),
        ];

        for (stage, data) in encoded {
            let path = format!("{}/{}_{}.png", CAPTURES_DIR, stem, stage);
            self.storage.write_file(&path, &data).await?;
        }
        tracing::debug!("Saved pipeline stages for {}", stem);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Storage> ScanPipeline for CameraPipeline<S> {
    async fn capture(&self) -> Result<Frame> {
        tracing::debug!("Capturing frame with {}", self.camera.describe());
        self.camera.capture(&self.captures_dir).await
    }

    async fn analyse(&self, frame: Frame) -> Result<Detection> {
        let path = frame.path.clone();
        let params = self.params.clone();

        // 影像處理佔用 CPU，不在 async 執行緒上做
        let output = tokio::task::spawn_blocking(move || {
            let img = load_image(&path)?;
            let img = if params.scale < 1.0 {
                rescale_image(&img, params.scale)?
            } else {
                img
            };
            detect(&img, &params)
        })
        .await
        .map_err(|e| WatcherError::detection(format!("Detection task failed: {}", e)))??;

        Ok(Detection {
            frame,
            coverage_ratio: output.coverage_ratio,
            threshold_level: output.threshold_level,
            stages: self.save_stages.then_some(output.stages),
        })
    }

    async fn record(
        &self,
        detection: &Detection,
        threshold_percent: f64,
        alarm: bool,
    ) -> Result<ScanRecord> {
        let record = ScanRecord::from_detection(detection, threshold_percent, alarm);
        history::append_record(&self.storage, &record).await?;

        // 階段影像只是輔助資料，寫入失敗不影響掃描紀錄
        if let Some(stages) = &detection.stages {
            if let Err(e) = self.write_stages(&detection.frame, stages).await {
                tracing::warn!(
                    "Failed to save pipeline stages for {}: {}",
                    detection.frame.stem(),
                    e
                );
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::camera::DirectoryCamera;
    use crate::adapters::storage::LocalStorage;
    use crate::core::detection::write_image;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn dusty_frame() -> RgbImage {
        RgbImage::from_fn(48, 48, |x, y| {
            if x % 6 == 3 && y % 6 == 3 {
                Rgb([240, 230, 200])
            } else {
                Rgb([60, 45, 30])
            }
        })
    }

    fn setup(save_stages: bool) -> (TempDir, TempDir, CameraPipeline<LocalStorage>) {
        let frames = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_image(&dusty_frame(), &frames.path().join("frame.png")).unwrap();

        let params = DetectionParams::default();
        let pipeline = CameraPipeline::new(
            LocalStorage::new(output.path()),
            Box::new(DirectoryCamera::new(frames.path())),
            output.path(),
            params,
            save_stages,
        );
        (frames, output, pipeline)
    }

    #[tokio::test]
    async fn test_capture_and_analyse() {
        let (_frames, output, pipeline) = setup(false);

        let frame = pipeline.capture().await.unwrap();
        assert!(frame.path.starts_with(output.path().join(CAPTURES_DIR)));

        let detection = pipeline.analyse(frame).await.unwrap();
        assert!(detection.coverage_ratio > 0.5);
        assert!(detection.stages.is_none());
        assert_eq!(detection.threshold_level, 32);
    }

    #[tokio::test]
    async fn test_record_writes_stages_and_history() {
        let (_frames, output, pipeline) = setup(true);

        let frame = pipeline.capture().await.unwrap();
        let stem = frame.stem();
        let detection = pipeline.analyse(frame).await.unwrap();
        let record = pipeline.record(&detection, 10.0, true).await.unwrap();

        assert!(record.alarm);
        assert_eq!(record.coverage_ratio, detection.coverage_ratio);
        for stage in ["original", "denoise", "difference", "grayscale", "threshold", "morph"] {
            let path = output
                .path()
                .join(CAPTURES_DIR)
                .join(format!("{}_{}.png", stem, stage));
            assert!(path.exists(), "missing {}", path.display());
        }

        let history = history::read_history(pipeline.storage()).await.unwrap();
        assert_eq!(history, vec![record]);
    }

    #[tokio::test]
    async fn test_stage_write_failure_keeps_history() {
        let (_frames, output, pipeline) = setup(true);

        let frame = pipeline.capture().await.unwrap();
        // 以資料夾佔住第一張階段影像的路徑
        std::fs::create_dir_all(
            output
                .path()
                .join(CAPTURES_DIR)
                .join(format!("{}_original.png", frame.stem())),
        )
        .unwrap();

        let detection = pipeline.analyse(frame).await.unwrap();
        let record = pipeline.record(&detection, 10.0, true).await.unwrap();

        let history = history::read_history(pipeline.storage()).await.unwrap();
        assert_eq!(history, vec![record]);
    }

    #[tokio::test]
    async fn test_analyse_rescales_before_detection() {
        let frames = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_image(&dusty_frame(), &frames.path().join("frame.png")).unwrap();

        let params = DetectionParams {
            scale: 0.5,
            ..DetectionParams::default()
        };
        let pipeline = CameraPipeline::new(
            LocalStorage::new(output.path()),
            Box::new(DirectoryCamera::new(frames.path())),
            output.path(),
            params,
            true,
        );

        let frame = pipeline.capture().await.unwrap();
        let detection = pipeline.analyse(frame).await.unwrap();
        let stages = detection.stages.as_ref().unwrap();

        assert_eq!(stages.original.dimensions(), (24, 24));
        assert_eq!(stages.morph.dimensions(), (24, 24));
        assert!((0.0..=1.0).contains(&detection.coverage_ratio));
    }

    #[tokio::test]
    async fn test_analyse_invalid_image() {
        let frames = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::write(frames.path().join("broken.png"), b"not an image").unwrap();

        let pipeline = CameraPipeline::new(
            LocalStorage::new(output.path()),
            Box::new(DirectoryCamera::new(frames.path())),
            output.path(),
            DetectionParams::default(),
            false,
        );

        let frame = pipeline.capture().await.unwrap();
        let err = pipeline.analyse(frame).await.unwrap_err();
        assert!(matches!(err, WatcherError::DetectionError { .. }));
    }
}
