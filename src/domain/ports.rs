use crate::domain::model::{Detection, Frame, ScanRecord};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// 檔案存取，路徑相對於輸出根目錄
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn append_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// 拍一張照片，存到 `output_dir` 之下
    async fn capture(&self, output_dir: &Path) -> Result<Frame>;

    fn describe(&self) -> String;
}

/// LED、蜂鳴器這類開關輸出
pub trait Indicator: Send + Sync {
    fn on(&mut self) -> Result<()>;
    fn off(&mut self) -> Result<()>;
    fn is_on(&self) -> bool;
}

#[async_trait]
pub trait Button: Send + Sync {
    async fn is_pressed(&self) -> Result<bool>;
}

#[async_trait]
pub trait ScanPipeline: Send + Sync {
    async fn capture(&self) -> Result<Frame>;
    async fn analyse(&self, frame: Frame) -> Result<Detection>;
    async fn record(&self, detection: &Detection, threshold_percent: f64, alarm: bool)
        -> Result<ScanRecord>;
}
