//! CLI 命令处理模块

pub mod status;
pub mod target;
pub mod watch;

pub use status::{handle_status, StatusArgs};
pub use target::{handle_down, handle_up};
pub use watch::{handle_watch, WatchArgs};

use crate::config::MonitorConfig;
use std::collections::HashMap;
use tracing::debug;

/// 环境协作方：把当前进程环境和配置里的覆盖项合并成命令环境
///
/// 监控核心只消费这份映射，不自己解析 shell/login 环境。
pub fn command_env(config: &MonitorConfig) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    if !config.env_vars.is_empty() {
        debug!(
            count = config.env_vars.len(),
            "applying configured environment overrides"
        );
        for (key, value) in &config.env_vars {
            env.insert(key.clone(), value.clone());
        }
    }
    env
}
