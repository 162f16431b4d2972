//! Tilt Monitor - 监控和管理本地 Tilt 开发环境
//!
//! 核心是健康与进程监控：轮询 Tilt 的状态 API、归并三态健康信号、
//! 按可达性自适应轮询节奏，并把 `tilt up`/`tilt down` 作为受管
//! 子进程的生命周期来管理。UI 渲染不在本 crate 范围内，下游只
//! 消费 [`monitor::MonitorState`] 的观察者接口。

pub mod cli;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod monitor;
pub mod scheduler;
pub mod status;

pub use config::MonitorConfig;
pub use health::{classify, Health, HealthSnapshot, StateCounts};
pub use lifecycle::{LaunchError, LifecycleManager, LifecycleState, ManagedProcess, StopError};
pub use monitor::{MonitorCommand, MonitorState, TiltMonitor};
pub use scheduler::{AdaptiveScheduler, Cadence};
pub use status::{
    parse_status_payload, ResourceLabel, ResourceStatus, RuntimeStatus, StatusClient,
    StatusError, UpdateStatus,
};
