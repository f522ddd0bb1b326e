use anyhow::Result;
use image::{Rgb, RgbImage};
use sawdust_watcher::adapters::{self, history, Panel};
use sawdust_watcher::core::detection::write_image;
use sawdust_watcher::core::pipeline::CAPTURES_DIR;
use sawdust_watcher::utils::validation::Validate;
use sawdust_watcher::{Alarm, CameraPipeline, LocalStorage, WatcherConfig, WatcherEngine};
use std::path::Path;
use tempfile::TempDir;

/// 乾淨的木板表面
fn clean_surface() -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        let grain = ((x + y) % 4) as u8;
        Rgb([150 + grain, 110 + grain, 70 + grain])
    })
}

/// 撒滿細小木屑的表面
fn dusty_surface() -> RgbImage {
    let mut img = clean_surface();
    for y in (2..64).step_by(5) {
        for x in (2..64).step_by(5) {
            img.put_pixel(x, y, Rgb([245, 235, 210]));
        }
    }
    img
}

fn write_config(dir: &Path, frames: &Path) -> Result<WatcherConfig> {
    let frames_path = frames.to_str().unwrap().replace('\\', "/");
    let config_content = format!(
        r#"
[gpio]
backend = "simulated"
led = 17
buzzer = 27
button = 22

[op]
scan_interval = 60
coverage_threshold_percent = 10.0

[detection]
scale = 1.0
save_stages = true

[camera]
backend = "directory"
directory = "{}"
"#,
        frames_path
    );

    let config_path = dir.join("config.toml");
    std::fs::write(&config_path, config_content)?;
    let config = WatcherConfig::from_file(&config_path)?;
    config.validate()?;
    Ok(config)
}

#[tokio::test]
async fn test_end_to_end_scans_and_alarm() -> Result<()> {
    let work = TempDir::new()?;
    let frames = TempDir::new()?;
    let output = TempDir::new()?;

    // 依檔名排序：先乾淨、後有木屑
    write_image(&clean_surface(), &frames.path().join("a_clean.png"))?;
    write_image(&dusty_surface(), &frames.path().join("b_dusty.png"))?;

    let config = write_config(work.path(), frames.path())?;
    let camera = adapters::camera_from_config(&config)?;
    let Panel {
        led,
        buzzer,
        button,
    } = adapters::panel_from_config(&config)?;

    let pipeline = CameraPipeline::new(
        LocalStorage::new(output.path()),
        camera,
        output.path(),
        config.detection_params(),
        config.save_stages(),
    );
    let mut engine = WatcherEngine::new(
        pipeline,
        Alarm::new(led, buzzer),
        button,
        config.watch_settings(),
    );

    let first = engine.scan_once().await?;
    assert_eq!(first.record.coverage_ratio, 0.0);
    assert!(!first.alarm_triggered);
    assert!(!engine.alarm().is_active());

    let second = engine.scan_once().await?;
    assert!(
        second.record.coverage_percent >= 10.0,
        "coverage {}",
        second.record.coverage_percent
    );
    assert!(second.alarm_triggered);
    assert!(engine.alarm().is_active());

    // 掃描紀錄
    let storage = LocalStorage::new(output.path());
    let records = history::read_history(&storage).await?;
    assert_eq!(records.len(), 2);
    assert!(!records[0].alarm);
    assert!(records[1].alarm);
    assert_eq!(records[1].threshold_percent, 10.0);

    // 每次掃描：原圖 + 六個階段影像
    let captures: Vec<_> = std::fs::read_dir(output.path().join(CAPTURES_DIR))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(captures.len(), 14);
    assert!(captures.iter().any(|name| name.ends_with("b_dusty_morph.png")));

    Ok(())
}

#[tokio::test]
async fn test_directory_camera_without_images_fails_scan() -> Result<()> {
    let work = TempDir::new()?;
    let frames = TempDir::new()?;
    let output = TempDir::new()?;

    let config = write_config(work.path(), frames.path())?;
    let Panel {
        led,
        buzzer,
        button,
    } = adapters::panel_from_config(&config)?;
    let pipeline = CameraPipeline::new(
        LocalStorage::new(output.path()),
        adapters::camera_from_config(&config)?,
        output.path(),
        config.detection_params(),
        false,
    );
    let mut engine = WatcherEngine::new(
        pipeline,
        Alarm::new(led, buzzer),
        button,
        config.watch_settings(),
    );

    let err = engine.scan_once().await.unwrap_err();
    assert_eq!(err.category(), sawdust_watcher::utils::error::ErrorCategory::Hardware);
    assert_eq!(engine.summary().scans, 0);
    assert!(!output.path().join(history::HISTORY_FILE).exists());

    Ok(())
}
