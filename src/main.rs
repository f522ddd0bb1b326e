use anyhow::Context;
use clap::Parser;
use sawdust_watcher::adapters::{self, Panel};
use sawdust_watcher::config::toml_config::{CameraBackend, GpioBackend};
use sawdust_watcher::utils::validation::{expand_home, Validate};
use sawdust_watcher::utils::logger;
use sawdust_watcher::{
    Alarm, CameraPipeline, CliArgs, LocalStorage, WatcherConfig, WatcherEngine,
};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let output_root = expand_home(&args.log);

    // 載入 TOML 配置
    let mut config = match WatcherConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    if args.simulate {
        config.gpio.backend = Some(GpioBackend::Simulated);
    }
    if let Some(monitor) = args.monitor {
        config.set_monitoring(monitor);
    }

    if let Err(e) = config.validate() {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    std::fs::create_dir_all(&output_root).with_context(|| {
        format!("Cannot create output directory {}", output_root.display())
    })?;

    // 初始化日誌
    let log_file = logger::init_watcher_logger(
        args.verbose,
        config.log_format(),
        Some(&output_root.join("logs")),
    )?;

    tracing::info!("Starting sawdust watcher script");
    if let Some(log_file) = &log_file {
        tracing::info!("📁 Logging to {}", log_file.display());
    }

    display_config_summary(&config, &output_root, &args);
    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no hardware was touched");
        return Ok(());
    }

    let camera = adapters::camera_from_config(&config)?;
    let Panel {
        led,
        buzzer,
        button,
    } = match adapters::panel_from_config(&config) {
        Ok(panel) => panel,
        Err(e) => {
            tracing::error!("❌ GPIO setup failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    let storage = LocalStorage::new(output_root.clone());
    let pipeline = CameraPipeline::new(
        storage,
        camera,
        &output_root,
        config.detection_params(),
        config.save_stages(),
    );

    let monitor_enabled = config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let mut engine = WatcherEngine::new_with_monitoring(
        pipeline,
        Alarm::new(led, buzzer),
        button,
        config.watch_settings(),
        monitor_enabled,
    );

    if args.once {
        let outcome = engine.scan_once().await;
        // 單次掃描後沒有人會按重置鈕，結束前一律熄滅輸出
        engine.shutdown();
        return match outcome {
            Ok(outcome) => {
                println!(
                    "Sawdust coverage: {:.2}% (threshold {}%){}",
                    outcome.record.coverage_percent,
                    outcome.record.threshold_percent,
                    if outcome.record.alarm {
                        " - ALARM (outputs switched off on exit)"
                    } else {
                        ""
                    }
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ Scan failed: {}", e);
                eprintln!("❌ {}", e.user_friendly_message());
                eprintln!("💡 建議: {}", e.recovery_suggestion());
                std::process::exit(e.exit_code());
            }
        };
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match engine.run(shutdown).await {
        Ok(summary) => {
            tracing::info!(
                "✅ Watcher stopped after {} scans ({} alarms, {} resets, {} failures)",
                summary.scans,
                summary.alarms,
                summary.resets,
                summary.failures
            );
        }
        Err(e) => {
            tracing::error!(
                "❌ Watcher stopped: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code().max(1));
        }
    }

    Ok(())
}

fn display_config_summary(config: &WatcherConfig, output_root: &Path, args: &CliArgs) {
    let settings = config.watch_settings();
    let params = config.detection_params();

    println!("📋 Configuration Summary:");
    println!("  Output: {}", output_root.display());
    println!(
        "  GPIO: {:?} (LED {}, buzzer {}, button {})",
        config.gpio_backend(),
        config.gpio.led,
        config.gpio.buzzer,
        config.gpio.button
    );
    match config.camera_backend() {
        CameraBackend::Command => println!(
            "  Camera: {} {}",
            config.camera_program(),
            config.camera_args().join(" ")
        ),
        CameraBackend::Directory => println!(
            "  Camera: replay {}",
            config
                .camera_directory()
                .map(|d| d.display().to_string())
                .unwrap_or_default()
        ),
    }
    println!("  Scan interval: {:?}", settings.scan_interval);
    println!(
        "  Coverage threshold: {}%",
        settings.coverage_threshold_percent
    );
    println!(
        "  Detection: noise {}, {:?}, morph {}x{}, scale {}",
        params.noise_size, params.threshold, params.morph_size, params.morph_iterations, params.scale
    );
    println!("  Save stages: {}", config.save_stages());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}
