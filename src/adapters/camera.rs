use crate::domain::model::Frame;
use crate::domain::ports::Camera;
use crate::utils::error::{Result, WatcherError};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 指令參數中的輸出路徑佔位符
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn capture_file_name(now: chrono::DateTime<Local>) -> String {
    format!("{}.png", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// 呼叫外部拍照指令（例如 rpicam-still）
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn render_args(&self, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

#[async_trait]
impl Camera for CommandCamera {
    async fn capture(&self, output_dir: &Path) -> Result<Frame> {
        tokio::fs::create_dir_all(output_dir).await?;

        let captured_at = Local::now();
        let path = output_dir.join(capture_file_name(captured_at));
        let args = self.render_args(&path);
        tracing::debug!("Running camera command: {} {}", self.program, args.join(" "));

        let mut command = tokio::process::Command::new(&self.program);
        command.args(&args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                WatcherError::camera(format!(
                    "'{}' did not finish within {:?}",
                    self.program, self.timeout
                ))
            })?
            .map_err(|e| WatcherError::camera(format!("Failed to start '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WatcherError::camera(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(WatcherError::camera(format!(
                "'{}' reported success but wrote no image to {}",
                self.program,
                path.display()
            )));
        }

        tracing::debug!("📸 Captured frame {}", path.display());
        Ok(Frame { path, captured_at })
    }

    fn describe(&self) -> String {
        format!("command '{}'", self.program)
    }
}

/// 依檔名順序循環播放資料夾中的影像，用於沒有相機的環境
#[derive(Debug)]
pub struct DirectoryCamera {
    directory: PathBuf,
    next: AtomicUsize,
}

impl DirectoryCamera {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            next: AtomicUsize::new(0),
        }
    }

    async fn list_images(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            WatcherError::camera(format!(
                "Cannot read image directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }
}

#[async_trait]
impl Camera for DirectoryCamera {
    async fn capture(&self, output_dir: &Path) -> Result<Frame> {
        let images = self.list_images().await?;
        if images.is_empty() {
            return Err(WatcherError::camera(format!(
                "No images found in {}",
                self.directory.display()
            )));
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % images.len();
        let source = &images[index];

        // 複製到 captures，讓各階段影像與原圖放在一起
        tokio::fs::create_dir_all(output_dir).await?;
        let captured_at = Local::now();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| capture_file_name(captured_at));
        let path = output_dir.join(format!(
            "{}_{}",
            captured_at.format("%Y-%m-%d_%H-%M-%S"),
            file_name
        ));
        tokio::fs::copy(source, &path).await?;

        tracing::debug!("📸 Replayed frame {} as {}", source.display(), path.display());
        Ok(Frame { path, captured_at })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.directory.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_camera_cycles_in_order() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::write(source.path().join("b.png"), b"b").unwrap();
        std::fs::write(source.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(source.path().join("notes.txt"), b"skip").unwrap();

        let camera = DirectoryCamera::new(source.path());
        let first = camera.capture(output.path()).await.unwrap();
        let second = camera.capture(output.path()).await.unwrap();
        let third = camera.capture(output.path()).await.unwrap();

        assert_eq!(std::fs::read(&first.path).unwrap(), b"a");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"b");
        assert_eq!(std::fs::read(&third.path).unwrap(), b"a");
        assert!(first.path.starts_with(output.path()));
    }

    #[tokio::test]
    async fn test_directory_camera_empty() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let camera = DirectoryCamera::new(source.path());

        let err = camera.capture(output.path()).await.unwrap_err();
        assert!(matches!(err, WatcherError::CameraError { .. }));
    }

    #[test]
    fn test_render_args_replaces_placeholder() {
        let camera = CommandCamera::new(
            "rpicam-still",
            vec!["--output".to_string(), OUTPUT_PLACEHOLDER.to_string()],
            Duration::from_secs(1),
        );
        let args = camera.render_args(Path::new("/tmp/captures/x.png"));
        assert_eq!(args, vec!["--output", "/tmp/captures/x.png"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_camera_runs_program() {
        let output = TempDir::new().unwrap();
        let camera = CommandCamera::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("printf frame > '{}'", OUTPUT_PLACEHOLDER),
            ],
            Duration::from_secs(10),
        );

        let frame = camera.capture(output.path()).await.unwrap();
        assert_eq!(std::fs::read(&frame.path).unwrap(), b"frame");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_camera_reports_failure() {
        let output = TempDir::new().unwrap();
        let camera = CommandCamera::new(
            "sh",
            vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()],
            Duration::from_secs(10),
        );

        let err = camera.capture(output.path()).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_command_camera_missing_program() {
        let output = TempDir::new().unwrap();
        let camera = CommandCamera::new(
            "definitely-not-a-camera-program",
            vec![],
            Duration::from_secs(10),
        );
        assert!(camera.capture(output.path()).await.is_err());
    }
}
