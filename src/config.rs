//! 配置模块 - Tilt Monitor 的运行配置
//!
//! 配置文件位于 `~/.config/tilt-monitor/config.json`（JSON 格式），
//! 不存在时使用默认值；缺失的字段逐项回退到默认值。
//! 本模块只读取配置，从不写入。

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Tilt 状态 API 的默认地址
pub const DEFAULT_BASE_URL: &str = "http://localhost:10350";

/// 默认快轮询间隔（秒）- Tilt 可达时的健康检查
pub const DEFAULT_KEEPALIVE_INTERVAL: u64 = 3;

/// 默认慢轮询间隔（秒）- Tilt 不可达时的探测
pub const DEFAULT_SLEEP_INTERVAL: u64 = 30;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_context() -> String {
    "docker-desktop".to_string()
}

fn default_keepalive() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL
}

fn default_sleep() -> u64 {
    DEFAULT_SLEEP_INTERVAL
}

fn default_tilt_bin() -> String {
    "tilt".to_string()
}

/// 监控配置
///
/// 字段语义与 Tilt Monitor 的 config.json 保持一致。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Tiltfile 路径，支持文件路径或其父目录（带或不带结尾的 `/Tiltfile`）
    pub tilt_file_path: String,
    /// Tilt 状态 API 基础 URL
    pub tilt_base_url: String,
    /// kubectl context，非空时追加 `--context <ctx>` 到 `tilt up` 参数
    pub tilt_context: String,
    /// 快轮询间隔（秒）
    pub keepalive_interval: u64,
    /// 慢轮询间隔（秒）
    pub sleep_interval: u64,
    /// 传给 `tilt up` 的额外参数（按空白切分）
    pub tilt_cmd_args: String,
    /// 附加环境变量，由调用方合并进命令环境
    pub env_vars: HashMap<String, String>,
    /// tilt 可执行文件（默认依赖 PATH 查找）
    pub tilt_bin: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tilt_file_path: String::new(),
            tilt_base_url: default_base_url(),
            tilt_context: default_context(),
            keepalive_interval: default_keepalive(),
            sleep_interval: default_sleep(),
            tilt_cmd_args: String::new(),
            env_vars: HashMap::new(),
            tilt_bin: default_tilt_bin(),
        }
    }
}

impl MonitorConfig {
    /// 配置文件路径：`~/.config/tilt-monitor/config.json`
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".config/tilt-monitor/config.json"))
    }

    /// 加载配置：文件不存在时返回默认值，存在但解析失败时报错
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_file_path() else {
            warn!("cannot determine home directory, using default config");
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    /// 从指定路径加载配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        config.validate()?;
        Ok(config)
    }

    /// 校验轮询节奏不变式：0 < keepalive < sleep
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval == 0 || self.sleep_interval == 0 {
            bail!("polling intervals must be greater than zero");
        }
        if self.keepalive_interval >= self.sleep_interval {
            bail!(
                "keepalive_interval ({}s) must be shorter than sleep_interval ({}s)",
                self.keepalive_interval,
                self.sleep_interval
            );
        }
        Ok(())
    }

    /// 状态 API 完整 URL
    pub fn status_url(&self) -> String {
        format!("{}/api/view?log=true", self.tilt_base_url.trim_end_matches('/'))
    }

    /// 归一化后的 Tiltfile 所在目录（配置里允许直接写 Tiltfile 文件路径）
    pub fn tiltfile_dir(&self) -> PathBuf {
        let path = Path::new(&self.tilt_file_path);
        if self.tilt_file_path.ends_with("Tiltfile") {
            path.parent().unwrap_or(Path::new("")).to_path_buf()
        } else {
            path.to_path_buf()
        }
    }

    /// tilt_file_path 是否指向有效的 Tiltfile
    pub fn is_tiltfile_path_valid(&self) -> bool {
        if self.tilt_file_path.is_empty() {
            return false;
        }
        let path = Path::new(&self.tilt_file_path);
        if path.is_dir() {
            return path.join("Tiltfile").is_file();
        }
        path.is_file() && path.file_name() == Some(std::ffi::OsStr::new("Tiltfile"))
    }

    /// `tilt up` 的额外参数：tilt_cmd_args 按空白切分，再追加 --context
    pub fn up_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .tilt_cmd_args
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if !self.tilt_context.is_empty() {
            args.push("--context".to_string());
            args.push(self.tilt_context.clone());
        }
        args
    }

    /// 快轮询周期
    pub fn fast_period(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval)
    }

    /// 慢轮询周期
    pub fn slow_period(&self) -> Duration {
        Duration::from_secs(self.sleep_interval)
    }
}
