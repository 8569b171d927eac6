use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use dockpipe_core::{init_logging, AppConfig};
use tokio::signal;
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("dockpipe")
        .version("1.0.0")
        .about("GPU分子对接批处理流水线")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/dockpipe.toml"),
        )
        .arg(
            Arg::new("structure-id")
                .short('s')
                .long("structure-id")
                .value_name("PDBID")
                .help("受体的4位结构标识"),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("FILE")
                .help("配体数据库（SDF）路径"),
        )
        .arg(
            Arg::new("database-label")
                .long("database-label")
                .value_name("LABEL")
                .help("数据库标签，用于运行目录命名"),
        )
        .arg(
            Arg::new("batch-size")
                .short('b')
                .long("batch-size")
                .value_name("N")
                .help("每个批次的配体数量")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("pool-width")
                .short('p')
                .long("pool-width")
                .value_name("N")
                .help("GPU执行槽位数量")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let log_level = matches.get_one::<String>("log-level").unwrap();
    let log_format = matches.get_one::<String>("log-format").unwrap();

    // 初始化日志系统
    init_logging(log_level, log_format).context("初始化日志失败")?;

    info!("启动GPU分子对接批处理流水线");

    // 加载配置；默认路径不存在时回退到内置默认值
    let mut config = if Path::new(config_path).exists() {
        AppConfig::load(Some(Path::new(config_path)))
            .with_context(|| format!("加载配置文件失败: {config_path}"))?
    } else {
        warn!("配置文件 {config_path} 不存在，使用默认配置");
        AppConfig::load(None).context("加载默认配置失败")?
    };

    // 命令行参数覆盖配置
    if let Some(id) = matches.get_one::<String>("structure-id") {
        config.run.structure_id = id.clone();
    }
    if let Some(db) = matches.get_one::<String>("database") {
        config.run.database_path = db.into();
    }
    if let Some(label) = matches.get_one::<String>("database-label") {
        config.run.database_label = label.clone();
    }
    if let Some(n) = matches.get_one::<usize>("batch-size") {
        config.run.batch_size = *n;
    }
    if let Some(n) = matches.get_one::<usize>("pool-width") {
        config.gpu.pool_width = *n;
    }
    config.validate().context("配置校验失败")?;

    // 创建应用和优雅关闭管理器
    let app = Arc::new(Application::new(config));
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        // 运行自然结束
        result = &mut app_handle => {
            let report = result.context("流水线任务异常终止")??;
            info!(run_id = %report.run_id, status = ?report.status, "流水线运行结束");
            info!("GPU分子对接批处理流水线已退出");
            return Ok(());
        }
        _ = wait_for_shutdown_signal() => {}
    }

    // 收到关闭信号：停止投递新批次，等待在途作业结束
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(result) => match result.context("流水线任务异常终止")? {
            Ok(report) => {
                info!(run_id = %report.run_id, "已产出部分运行报告");
            }
            Err(e) => {
                error!("关闭期间流水线出错: {e}");
            }
        },
        Err(_) => {
            warn!("流水线关闭超时，强制退出");
        }
    }

    info!("GPU分子对接批处理流水线已退出");
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
