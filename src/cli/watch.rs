//! Watch 命令 - 前台运行监控循环，打印状态变化

use crate::config::MonitorConfig;
use crate::monitor::{MonitorCommand, TiltMonitor};
use anyhow::{bail, Result};
use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

/// Watch 命令参数
#[derive(Args)]
pub struct WatchArgs {
    /// 健康检查间隔秒数（优先级：参数 > TMB_TIME_INTERVAL 环境变量 > 配置）
    #[arg(long, short = 't')]
    pub time_interval: Option<u64>,

    /// 启动时执行 tilt up
    #[arg(long, short)]
    pub up: bool,
}

/// 处理 watch 命令
pub async fn handle_watch(args: WatchArgs) -> Result<()> {
    let mut config = MonitorConfig::load()?;
    if let Some(interval) = args.time_interval {
        config.keepalive_interval = interval;
    } else if let Ok(value) = std::env::var("TMB_TIME_INTERVAL") {
        if let Ok(interval) = value.parse() {
            config.keepalive_interval = interval;
        }
    }
    config.validate()?;

    if args.up && !config.is_tiltfile_path_valid() {
        bail!("cannot run tilt up: tilt_file_path is not configured or is invalid");
    }

    info!(
        interval_secs = config.keepalive_interval,
        url = %config.status_url(),
        "starting tilt monitor"
    );

    let env = super::command_env(&config);
    let mut monitor = TiltMonitor::new(config, env)?;
    monitor.subscribe(|state| {
        println!(
            "[{}] tilt is {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            state
        );
    });

    let (tx, rx) = mpsc::unbounded_channel();
    if args.up {
        tx.send(MonitorCommand::StartTarget)?;
    }

    let monitor_loop = tokio::spawn(monitor.run(rx));
    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    tx.send(MonitorCommand::Shutdown)?;
    monitor_loop.await?;
    Ok(())
}
