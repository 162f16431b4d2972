//! 进程生命周期模块 - 把 Tilt 作为受管子进程启动和停止
//!
//! 状态流转：Idle -> Launching -> Ready -> Idle（stop），
//! 启动失败时 Launching -> Idle。每次 start 恰好转移一次子进程
//! 所有权；stop 无论结果如何都清除所有权（乐观回到 Idle）。

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// 没有受管进程
    Idle,
    /// 已 spawn，等待 API 就绪
    Launching,
    /// API 已应答过，进程视为就绪
    Ready,
}

/// 启动失败：对本次 start 而言是终态，不自动重试
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("a managed tilt process is already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("`{0}` binary not found on PATH")]
    BinaryNotFound(String),
    #[error("workdir does not contain a Tiltfile: {0}")]
    InvalidWorkdir(String),
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// 停止失败：上报给调用方，但不阻止生命周期回到 Idle
#[derive(Debug, Error)]
pub enum StopError {
    #[error("sent SIGTERM to pid {pid} but exit was not confirmed within {timeout_secs}s")]
    NotConfirmed { pid: u32, timeout_secs: u64 },
    #[error("`{command}` did not complete: {reason}")]
    Fallback { command: String, reason: String },
}

/// 受管的 Tilt 子进程
pub struct ManagedProcess {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub command: String,
    child: Child,
}

/// 生命周期管理器：持有受管进程句柄
pub struct LifecycleManager {
    program: String,
    state: LifecycleState,
    process: Option<ManagedProcess>,
}

impl LifecycleManager {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            state: LifecycleState::Idle,
            process: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn process(&self) -> Option<&ManagedProcess> {
        self.process.as_ref()
    }

    /// 是否持有受管进程的所有权
    pub fn owns_process(&self) -> bool {
        self.process.is_some()
    }

    /// 启动 `{program} up {extra_args}`
    ///
    /// 环境映射由调用方解析好传入（本模块不做 shell 环境解析），
    /// 完全替换继承的进程环境。spawn 失败是终态错误，不重试。
    pub fn start(
        &mut self,
        extra_args: &[String],
        workdir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<u32, LaunchError> {
        if let Some(process) = &self.process {
            return Err(LaunchError::AlreadyRunning(process.pid));
        }
        which::which(&self.program)
            .map_err(|_| LaunchError::BinaryNotFound(self.program.clone()))?;
        if !workdir.join("Tiltfile").is_file() {
            return Err(LaunchError::InvalidWorkdir(workdir.display().to_string()));
        }

        let mut command_line = format!("{} up", self.program);
        for arg in extra_args {
            command_line.push(' ');
            command_line.push_str(arg);
        }
        info!(command = %command_line, workdir = %workdir.display(), "running tilt up");

        let child = Command::new(&self.program)
            .arg("up")
            .args(extra_args)
            .current_dir(workdir)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let pid = child.id().unwrap_or(0);
        self.process = Some(ManagedProcess {
            pid,
            started_at: Utc::now(),
            command: command_line,
            child,
        });
        self.state = LifecycleState::Launching;
        Ok(pid)
    }

    /// 就绪轮询首次成功后调用：Launching -> Ready
    pub fn confirm_ready(&mut self) {
        if self.state == LifecycleState::Launching {
            self.state = LifecycleState::Ready;
        }
    }

    /// 非阻塞检查受管进程是否已退出；已退出则确认崩溃并清除所有权
    pub fn reap_if_exited(&mut self) -> Option<ExitStatus> {
        let process = self.process.as_mut()?;
        match process.child.try_wait() {
            Ok(Some(status)) => {
                warn!(pid = process.pid, %status, "managed tilt process exited");
                self.process = None;
                self.state = LifecycleState::Idle;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("cannot poll managed tilt process: {}", e);
                None
            }
        }
    }

    /// 停止 Tilt
    ///
    /// 持有句柄时：SIGTERM + 限时等待退出确认，超时报 `NotConfirmed`。
    /// 没有句柄时（外部启动或已退出）：尽力执行 `{program} down`，
    /// 用环境继承的方式运行。两条路径都会无条件回到 Idle。
    pub async fn stop(&mut self, confirm_timeout: Duration) -> Result<(), StopError> {
        let owned = self.process.take();
        self.state = LifecycleState::Idle;
        match owned {
            Some(process) => self.stop_owned(process, confirm_timeout).await,
            None => self.run_stop_command(confirm_timeout).await,
        }
    }

    async fn stop_owned(
        &self,
        mut process: ManagedProcess,
        confirm_timeout: Duration,
    ) -> Result<(), StopError> {
        info!(pid = process.pid, "terminating tilt process");
        let term = Command::new("kill")
            .args(["-TERM", &process.pid.to_string()])
            .output()
            .await;
        match term {
            Ok(output) if output.status.success() => {}
            Ok(output) => warn!(pid = process.pid, status = %output.status, "kill -TERM failed"),
            Err(e) => warn!(pid = process.pid, "cannot send SIGTERM: {}", e),
        }

        match tokio::time::timeout(confirm_timeout, process.child.wait()).await {
            Ok(Ok(status)) => {
                let uptime = Utc::now()
                    .signed_duration_since(process.started_at)
                    .num_seconds();
                info!(pid = process.pid, %status, uptime_secs = uptime, "tilt process exited");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(pid = process.pid, "cannot await tilt process exit: {}", e);
                Err(StopError::NotConfirmed {
                    pid: process.pid,
                    timeout_secs: confirm_timeout.as_secs(),
                })
            }
            Err(_) => Err(StopError::NotConfirmed {
                pid: process.pid,
                timeout_secs: confirm_timeout.as_secs(),
            }),
        }
    }

    async fn run_stop_command(&self, confirm_timeout: Duration) -> Result<(), StopError> {
        let command_line = format!("{} down", self.program);
        info!(command = %command_line, "no managed process, requesting stop via command");

        let mut child = Command::new(&self.program)
            .arg("down")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StopError::Fallback {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(confirm_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                debug!(command = %command_line, "stop command completed");
                Ok(())
            }
            Ok(Ok(status)) => Err(StopError::Fallback {
                command: command_line,
                reason: format!("exited with {}", status),
            }),
            Ok(Err(e)) => Err(StopError::Fallback {
                command: command_line,
                reason: e.to_string(),
            }),
            // 超时不终止 down 命令，让它在后台继续跑
            Err(_) => Err(StopError::Fallback {
                command: command_line,
                reason: format!("no exit within {}s", confirm_timeout.as_secs()),
            }),
        }
    }
}
