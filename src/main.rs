//! Tilt Monitor CLI
//!
//! 监控和管理本地 Tilt 开发环境（健康轮询、tilt up/down 生命周期）。

use anyhow::Result;
use clap::{Parser, Subcommand};
use tilt_monitor::cli::{handle_down, handle_status, handle_up, handle_watch, StatusArgs, WatchArgs};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "tiltmon")]
#[command(about = "Tilt Monitor - 监控和管理本地 Tilt 开发环境")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 前台运行监控循环，打印状态变化
    Watch(WatchArgs),
    /// 拉取一次 Tilt 状态并打印资源表
    Status(StatusArgs),
    /// 启动 Tilt 并等待状态 API 就绪
    Up,
    /// 停止 Tilt
    Down,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug tiltmon watch
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tilt_monitor=info,tiltmon=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch(args) => handle_watch(args).await,
        Commands::Status(args) => handle_status(args).await,
        Commands::Up => handle_up().await,
        Commands::Down => handle_down().await,
    }
}
