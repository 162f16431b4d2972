//! 健康分类模块 - 把资源状态列表归并为三态健康信号
//!
//! [`classify`] 是纯函数：不做 I/O，同样的输入永远得到同样的快照。
//! 无法归类的状态组合记入快照的 `anomalies`，由调用方决定怎么记日志。

use crate::status::{ResourceStatus, RuntimeStatus, UpdateStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 聚合健康信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Pending,
    Unhealthy,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Pending => write!(f, "pending"),
            Health::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// 按类别统计的资源数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub ok: u32,
    pub pending: u32,
    pub error: u32,
    pub warn: u32,
}

impl StateCounts {
    /// 渲染成一行摘要，例如 `🔴 2  🟡 1  ⚪️ 3  🟢 4`，全零时为空串
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.error > 0 {
            parts.push(format!("🔴 {}", self.error));
        }
        if self.warn > 0 {
            parts.push(format!("🟡 {}", self.warn));
        }
        if self.pending > 0 {
            parts.push(format!("⚪️ {}", self.pending));
        }
        if self.ok > 0 {
            parts.push(format!("🟢 {}", self.ok));
        }
        parts.join("  ")
    }
}

/// 一次轮询得出的健康快照，每次重算、从不原地修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub health: Health,
    pub counts: StateCounts,
    /// 无法归类的状态描述，调用方负责记日志
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<String>,
}

impl HealthSnapshot {
    /// Tilt 可达但 API 应答异常时的替代快照
    pub fn unhealthy() -> Self {
        Self {
            health: Health::Unhealthy,
            counts: StateCounts::default(),
            anomalies: Vec::new(),
        }
    }
}

/// 单个状态字段参与聚合时的等价类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateClass {
    Ok,
    Pending,
    Error,
    Other,
}

impl UpdateStatus {
    fn aggregate_class(self) -> AggregateClass {
        match self {
            UpdateStatus::Error => AggregateClass::Error,
            UpdateStatus::Pending | UpdateStatus::InProgress => AggregateClass::Pending,
            UpdateStatus::Ok => AggregateClass::Ok,
            UpdateStatus::None | UpdateStatus::Unknown => AggregateClass::Other,
        }
    }
}

impl RuntimeStatus {
    /// not_applicable 不参与聚合，返回 None
    fn aggregate_class(self) -> Option<AggregateClass> {
        match self {
            RuntimeStatus::NotApplicable => None,
            RuntimeStatus::Error => Some(AggregateClass::Error),
            RuntimeStatus::Pending | RuntimeStatus::InProgress => Some(AggregateClass::Pending),
            RuntimeStatus::Ok => Some(AggregateClass::Ok),
            RuntimeStatus::Unknown => Some(AggregateClass::Other),
        }
    }
}

/// 把资源状态列表归并为健康快照
///
/// 计数的归类优先级（先命中先算）：
/// 1. 显式禁用 -> 不计入
/// 2. 有警告 -> warn
/// 3. 任一状态为 error -> error
/// 4. 任一状态为 pending/in_progress -> pending
/// 5. update ok 且 runtime ok/not_applicable -> ok
/// 6. 其余不计数，记为异常
///
/// 聚合健康只看 update/runtime 两个字段（忽略 not_applicable）：
/// error 压过 pending，pending 压过 ok；空集或只剩未识别状态时
/// 按失败安全原则判为 Unhealthy 并附带异常信号。
pub fn classify(resources: &[ResourceStatus]) -> HealthSnapshot {
    let mut counts = StateCounts::default();
    let mut anomalies = Vec::new();

    for resource in resources {
        if resource.disabled {
            continue;
        }
        if resource.warning_count > 0 || !resource.warnings.is_empty() {
            counts.warn += 1;
            continue;
        }
        let update = resource.update_status;
        let runtime = resource.runtime_status;
        if update == UpdateStatus::Error || runtime == RuntimeStatus::Error {
            counts.error += 1;
        } else if matches!(update, UpdateStatus::Pending | UpdateStatus::InProgress)
            || matches!(runtime, RuntimeStatus::Pending | RuntimeStatus::InProgress)
        {
            counts.pending += 1;
        } else if update == UpdateStatus::Ok
            && matches!(runtime, RuntimeStatus::Ok | RuntimeStatus::NotApplicable)
        {
            counts.ok += 1;
        } else {
            anomalies.push(format!(
                "{}: uncategorized status update={} runtime={}",
                resource.name, update, runtime
            ));
        }
    }

    let statuses: Vec<AggregateClass> = resources
        .iter()
        .flat_map(|r| {
            [
                Some(r.update_status.aggregate_class()),
                r.runtime_status.aggregate_class(),
            ]
        })
        .flatten()
        .collect();

    let health = if statuses.iter().any(|s| *s == AggregateClass::Error) {
        Health::Unhealthy
    } else if statuses.iter().any(|s| *s == AggregateClass::Pending) {
        Health::Pending
    } else if !statuses.is_empty() && statuses.iter().all(|s| *s == AggregateClass::Ok) {
        Health::Healthy
    } else {
        // 空集或只剩未识别状态：按失败安全偏置判为不健康
        anomalies.push(format!(
            "cannot derive aggregate health from {} status values",
            statuses.len()
        ));
        Health::Unhealthy
    };

    HealthSnapshot {
        health,
        counts,
        anomalies,
    }
}
