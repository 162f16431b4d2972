//! 监控状态机模块 - 组合状态客户端、健康分类、调度器和生命周期
//!
//! 唯一权威状态 [`MonitorState`] 由本模块持有并驱动，下游（UI 等）
//! 通过观察者回调拿到最新值，自身不包含任何监控逻辑。所有轮询和
//! 状态转移都发生在 [`TiltMonitor::run`] 的单个协作式循环里，
//! 任一时刻只有一个轮询在跑，共享状态无需加锁。

use crate::config::MonitorConfig;
use crate::health::{classify, Health, HealthSnapshot};
use crate::lifecycle::{LaunchError, LifecycleManager, LifecycleState};
use crate::scheduler::{AdaptiveScheduler, Cadence};
use crate::status::{ResourceStatus, StatusClient, StatusError};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 就绪轮询周期（启动中独有的紧凑循环，区别于自适应调度）
const READY_PROBE_PERIOD: Duration = Duration::from_secs(1);

/// 就绪轮询的单次请求超时
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Down 状态下可达性探测的请求超时
const REACHABILITY_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// 停止后等待进程退出确认的时限
const STOP_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// 监控状态：单一权威实例，只通过状态机转移
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorState {
    /// Tilt 不可达
    Down,
    /// 受管进程已启动，状态 API 尚未应答过
    Starting,
    /// Tilt 可达，携带最近一次健康快照
    Up(HealthSnapshot),
}

impl MonitorState {
    pub fn is_down(&self) -> bool {
        matches!(self, MonitorState::Down)
    }

    pub fn is_starting(&self) -> bool {
        matches!(self, MonitorState::Starting)
    }

    pub fn is_up(&self) -> bool {
        matches!(self, MonitorState::Up(_))
    }

    /// Up 状态下的健康信号
    pub fn health(&self) -> Option<Health> {
        match self {
            MonitorState::Up(snapshot) => Some(snapshot.health),
            _ => None,
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Down => write!(f, "down"),
            MonitorState::Starting => write!(f, "starting"),
            MonitorState::Up(snapshot) => write!(f, "up ({})", snapshot.health),
        }
    }
}

/// 外部发给监控循环的指令
#[derive(Debug)]
pub enum MonitorCommand {
    /// 启动 Tilt（等价于菜单里的 Tilt Up）
    StartTarget,
    /// 停止 Tilt
    StopTarget,
    /// 结束监控循环；自己启动的进程会被一并停掉
    Shutdown,
}

type Observer = Box<dyn Fn(&MonitorState) + Send>;

/// Tilt 监控状态机
pub struct TiltMonitor {
    config: MonitorConfig,
    /// 由外部协作方解析好的命令环境（本模块只消费）
    command_env: HashMap<String, String>,
    client: StatusClient,
    scheduler: AdaptiveScheduler,
    lifecycle: LifecycleManager,
    state: MonitorState,
    observers: Vec<Observer>,
}

impl TiltMonitor {
    pub fn new(config: MonitorConfig, command_env: HashMap<String, String>) -> Result<Self> {
        config.validate()?;
        let client = StatusClient::new(&config)?;
        let scheduler = AdaptiveScheduler::new(config.fast_period(), config.slow_period());
        let lifecycle = LifecycleManager::new(config.tilt_bin.clone());
        Ok(Self {
            config,
            command_env,
            client,
            scheduler,
            lifecycle,
            state: MonitorState::Down,
            observers: Vec::new(),
        })
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn cadence(&self) -> Cadence {
        self.scheduler.cadence()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// 注册状态观察者；通知按注册顺序同步执行
    pub fn subscribe(&mut self, observer: impl Fn(&MonitorState) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// 启动 Tilt：Down -> Starting
    ///
    /// 其他状态下的启动请求是 no-op。spawn 失败原样上抛，状态留在 Down。
    pub fn start_target(&mut self) -> Result<(), LaunchError> {
        if !self.state.is_down() {
            warn!(state = %self.state, "ignoring start request, tilt is not down");
            return Ok(());
        }
        info!("starting tilt");
        let workdir = self.config.tiltfile_dir();
        let pid = self
            .lifecycle
            .start(&self.config.up_args(), &workdir, &self.command_env)?;
        debug!(pid, "tilt up spawned, waiting for status api");
        self.set_state(MonitorState::Starting);
        Ok(())
    }

    /// 停止 Tilt：任意状态 -> Down
    ///
    /// 进行中的就绪轮询随状态切换一起取消。停止失败只告警不回滚，
    /// 从监控视角看"已请求停止"就是终态。
    pub async fn stop_target(&mut self) {
        info!("stopping tilt");
        if let Err(e) = self.lifecycle.stop(STOP_CONFIRM_TIMEOUT).await {
            warn!("tilt stop not confirmed: {}", e);
        }
        self.scheduler.reachability_changed(false);
        self.set_state(MonitorState::Down);
    }

    /// 消化一次稳态轮询结果
    pub fn apply_poll(&mut self, result: Result<Vec<ResourceStatus>, StatusError>) {
        if self.state.is_starting() {
            // 启动期的结果一律按就绪探测处理
            self.apply_ready_probe(result);
            return;
        }
        match result {
            Ok(resources) => {
                self.scheduler.reachability_changed(true);
                if self.state.is_down() {
                    // 外部启动的 Tilt 也要能被发现
                    info!("tilt daemon is running");
                }
                self.apply_snapshot(classify(&resources));
            }
            Err(StatusError::Unreachable(reason)) => {
                debug!(%reason, "tilt api unreachable");
                self.scheduler.reachability_changed(false);
                if !self.state.is_down() {
                    info!("tilt daemon is not running");
                    self.set_state(MonitorState::Down);
                }
            }
            Err(e) => {
                // 可达但应答异常：按运行中但不健康处理，绝不视为 Down
                warn!("error getting tilt status: {}", e);
                self.scheduler.reachability_changed(true);
                if self.state.is_down() {
                    info!("tilt daemon is running, but status api returned an error");
                }
                self.set_state(MonitorState::Up(HealthSnapshot::unhealthy()));
            }
        }
    }

    /// 消化一次就绪探测结果（仅 Starting 状态有意义）
    pub fn apply_ready_probe(&mut self, result: Result<Vec<ResourceStatus>, StatusError>) {
        if !self.state.is_starting() {
            return;
        }
        match result {
            Ok(resources) => {
                self.lifecycle.confirm_ready();
                self.scheduler.reachability_changed(true);
                info!("tilt api is now available");
                self.apply_snapshot(classify(&resources));
            }
            Err(_) => {
                // API 还没起来，下个周期再试；但启动即崩溃要能兜住
                if self.lifecycle.reap_if_exited().is_some() {
                    error!("tilt process exited before the status api became available");
                    self.scheduler.reachability_changed(false);
                    self.set_state(MonitorState::Down);
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: HealthSnapshot) {
        for anomaly in &snapshot.anomalies {
            warn!(%anomaly, "unknown tilt status");
        }
        self.set_state(MonitorState::Up(snapshot));
    }

    /// 稳态轮询的请求超时：Down 时短超时探测可达性，Up 时不限时
    fn poll_timeout(&self) -> Option<Duration> {
        match self.state {
            MonitorState::Down => Some(REACHABILITY_PROBE_TIMEOUT),
            _ => None,
        }
    }

    /// 状态转移 + 通知
    ///
    /// Up -> Up 仅在健康信号变化时通知观察者（降噪，不是正确性要求），
    /// 其余跨状态转移一律通知。
    fn set_state(&mut self, next: MonitorState) {
        let notify = match (&self.state, &next) {
            (MonitorState::Up(prev), MonitorState::Up(new)) => prev.health != new.health,
            (prev, new) => std::mem::discriminant(prev) != std::mem::discriminant(new),
        };

        if let Some(health) = next.health() {
            if self.state.health() != Some(health) {
                match health {
                    Health::Healthy => info!("tilt status: ok"),
                    Health::Pending => warn!("tilt status: pending"),
                    Health::Unhealthy => error!("tilt status: error"),
                }
            }
        }

        self.state = next;
        if notify {
            debug!(state = %self.state, "monitor state changed");
            self.notify_observers();
        }
    }

    /// 按注册顺序同步通知；观察者 panic 被捕获记日志，不向上传播
    fn notify_observers(&self) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&self.state))).is_err() {
                warn!("state observer panicked");
            }
        }
    }

    async fn handle_command(&mut self, command: MonitorCommand) -> bool {
        match command {
            MonitorCommand::StartTarget => {
                if let Err(e) = self.start_target() {
                    error!("cannot start tilt: {}", e);
                }
                true
            }
            MonitorCommand::StopTarget => {
                self.stop_target().await;
                true
            }
            MonitorCommand::Shutdown => {
                // 只收掉自己启动的进程，外部启动的 Tilt 保持运行
                if self.lifecycle.owns_process() {
                    self.stop_target().await;
                }
                info!("monitor shutting down");
                false
            }
        }
    }

    /// 监控主循环
    ///
    /// Starting 期间走 1 秒一次的就绪探测，否则按自适应节奏轮询。
    /// 指令通道关闭或收到 Shutdown 时退出。
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<MonitorCommand>) {
        // 启动时先探测一次，确定初始状态与节奏
        let initial = self
            .client
            .fetch_status(Some(REACHABILITY_PROBE_TIMEOUT))
            .await;
        self.apply_poll(initial);

        loop {
            let starting = self.state.is_starting();
            let delay = if starting {
                READY_PROBE_PERIOD
            } else {
                self.scheduler.period()
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep(delay) => {
                    if starting {
                        let result = self.client.fetch_status(Some(READY_PROBE_TIMEOUT)).await;
                        self.apply_ready_probe(result);
                    } else {
                        let timeout = self.poll_timeout();
                        let result = self.client.fetch_status(timeout).await;
                        self.apply_poll(result);
                    }
                }
            }
        }
    }
}
