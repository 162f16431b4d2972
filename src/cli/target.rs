//! Up/Down 命令 - 从命令行启动和停止 Tilt

use crate::config::MonitorConfig;
use crate::lifecycle::LifecycleManager;
use crate::status::StatusClient;
use anyhow::{bail, Result};
use std::time::Duration;
use tracing::info;

/// 就绪轮询间隔与单次请求超时
const READY_PROBE_PERIOD: Duration = Duration::from_secs(1);
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// `tilt down` 的等待时限（回退路径要给资源清理留时间）
const DOWN_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// 处理 up 命令：启动 Tilt 并阻塞到状态 API 就绪
///
/// 就绪等待沿用参考行为，不设尝试上限；Ctrl-C 是唯一的中断方式。
/// 退出后 Tilt 继续在后台运行。
pub async fn handle_up() -> Result<()> {
    let config = MonitorConfig::load()?;
    if !config.is_tiltfile_path_valid() {
        bail!(
            "tilt_file_path is not configured or is invalid; set it in {}",
            MonitorConfig::config_file_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        );
    }

    let env = super::command_env(&config);
    let client = StatusClient::new(&config)?;
    let mut lifecycle = LifecycleManager::new(config.tilt_bin.clone());

    let pid = lifecycle.start(&config.up_args(), &config.tiltfile_dir(), &env)?;
    println!("tilt up started (pid {}), waiting for the status api...", pid);

    loop {
        tokio::time::sleep(READY_PROBE_PERIOD).await;
        if let Some(status) = lifecycle.reap_if_exited() {
            bail!("tilt exited before the status api became available ({})", status);
        }
        if client.fetch_status(Some(READY_PROBE_TIMEOUT)).await.is_ok() {
            break;
        }
    }

    lifecycle.confirm_ready();
    info!("tilt api is now available");
    println!("tilt is up: {}", client.status_url());
    Ok(())
}

/// 处理 down 命令
///
/// 命令行场景下没有受管句柄，走 `tilt down` 回退路径；
/// 失败只上报，不影响退出码（停止请求即视为终态）。
pub async fn handle_down() -> Result<()> {
    let config = MonitorConfig::load()?;
    let mut lifecycle = LifecycleManager::new(config.tilt_bin.clone());
    match lifecycle.stop(DOWN_CONFIRM_TIMEOUT).await {
        Ok(()) => println!("tilt stopped"),
        Err(e) => println!("tilt stop requested, but not confirmed: {}", e),
    }
    Ok(())
}
