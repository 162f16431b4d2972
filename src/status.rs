//! 状态客户端模块 - 拉取并解析 Tilt 的 `/api/view` 状态
//!
//! 负责一次 HTTP GET + JSON 解码，把 `uiResources` 映射成 [`ResourceStatus`]
//! 列表。传输层错误被归类为 [`StatusError`] 返回，绝不跨边界 panic。

use crate::config::MonitorConfig;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 状态拉取失败的分类
#[derive(Debug, Error)]
pub enum StatusError {
    /// 连接被拒绝或超时 - Tilt 没有在运行
    #[error("tilt api is unreachable: {0}")]
    Unreachable(String),
    /// Tilt 可达，但 API 返回非 2xx 或传输中途失败
    #[error("tilt api request failed: {0}")]
    Protocol(String),
    /// 响应体不是合法的状态 JSON（对状态机而言等同 Protocol）
    #[error("tilt status payload did not parse: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StatusError {
    /// 该错误是否说明 Tilt 进程仍然可达
    pub fn is_reachable(&self) -> bool {
        !matches!(self, StatusError::Unreachable(_))
    }
}

/// 资源的构建状态（wire 值：none/pending/in_progress/ok/error）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    None,
    Pending,
    InProgress,
    Ok,
    Error,
    /// 未识别的 wire 值，走异常路径
    #[serde(other)]
    Unknown,
}

/// 资源的运行状态（wire 值：not_applicable/pending/in_progress/ok/error）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    NotApplicable,
    Pending,
    InProgress,
    Ok,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStatus::None => "none",
            UpdateStatus::Pending => "pending",
            UpdateStatus::InProgress => "in_progress",
            UpdateStatus::Ok => "ok",
            UpdateStatus::Error => "error",
            UpdateStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeStatus::NotApplicable => "n/a",
            RuntimeStatus::Pending => "pending",
            RuntimeStatus::InProgress => "in_progress",
            RuntimeStatus::Ok => "ok",
            RuntimeStatus::Error => "error",
            RuntimeStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// 资源的展示分组标签
///
/// 排序规则：具名标签按字母序在前，然后是未打标签的资源，
/// Tiltfile 自身固定排在最后。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLabel {
    Named(String),
    Unlabeled,
    Tiltfile,
}

impl ResourceLabel {
    /// 稳定排序键：(组序号, 组内标签)
    fn sort_key(&self) -> (u8, &str) {
        match self {
            ResourceLabel::Named(name) => (0, name.as_str()),
            ResourceLabel::Unlabeled => (1, ""),
            ResourceLabel::Tiltfile => (2, ""),
        }
    }
}

impl fmt::Display for ResourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLabel::Named(name) => write!(f, "{}", name),
            ResourceLabel::Unlabeled => write!(f, "unlabeled"),
            ResourceLabel::Tiltfile => write!(f, "Tiltfile"),
        }
    }
}

impl Serialize for ResourceLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 单个 Tilt 资源在一次轮询中的状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceStatus {
    pub label: ResourceLabel,
    pub name: String,
    pub update_status: UpdateStatus,
    pub runtime_status: RuntimeStatus,
    /// 资源被显式禁用（disableStatus.state == "Disabled"）
    pub disabled: bool,
    pub warning_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ---- /api/view 的 wire 结构（仅用于反序列化） ----

#[derive(Deserialize)]
struct StatusView {
    #[serde(default, rename = "uiResources")]
    ui_resources: Vec<UiResource>,
}

#[derive(Deserialize)]
struct UiResource {
    metadata: ResourceMetadata,
    #[serde(default)]
    status: RawResourceState,
}

#[derive(Deserialize)]
struct ResourceMetadata {
    name: String,
    #[serde(default)]
    labels: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResourceState {
    #[serde(default = "default_update_status")]
    update_status: UpdateStatus,
    #[serde(default = "default_runtime_status")]
    runtime_status: RuntimeStatus,
    #[serde(default)]
    disable_status: Option<DisableStatus>,
    #[serde(default)]
    warning_count: Option<u32>,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct DisableStatus {
    #[serde(default)]
    state: Option<String>,
}

fn default_update_status() -> UpdateStatus {
    UpdateStatus::None
}

fn default_runtime_status() -> RuntimeStatus {
    RuntimeStatus::Unknown
}

impl Default for RawResourceState {
    fn default() -> Self {
        Self {
            update_status: default_update_status(),
            runtime_status: default_runtime_status(),
            disable_status: None,
            warning_count: None,
            warnings: None,
        }
    }
}

impl UiResource {
    fn into_resource_status(self) -> ResourceStatus {
        // 标签取 metadata.labels 的第一个值；Tiltfile 自身用合成标签
        let label = self
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.values().next())
            .and_then(|v| v.as_str())
            .map(|s| ResourceLabel::Named(s.to_string()))
            .unwrap_or_else(|| {
                if self.metadata.name == "(Tiltfile)" {
                    ResourceLabel::Tiltfile
                } else {
                    ResourceLabel::Unlabeled
                }
            });

        let disabled = self
            .status
            .disable_status
            .as_ref()
            .and_then(|d| d.state.as_deref())
            .map(|s| s == "Disabled")
            .unwrap_or(false);

        let warnings = self.status.warnings.unwrap_or_default();
        let warning_count = self.status.warning_count.unwrap_or(warnings.len() as u32);

        ResourceStatus {
            label,
            name: self.metadata.name,
            update_status: self.status.update_status,
            runtime_status: self.status.runtime_status,
            disabled,
            warning_count,
            warnings,
        }
    }
}

/// 解析 `/api/view` 响应体为排好序的资源列表
///
/// `updateStatus == none` 的条目在此处丢弃，不会进入任何下游计算。
pub fn parse_status_payload(body: &str) -> Result<Vec<ResourceStatus>, serde_json::Error> {
    let view: StatusView = serde_json::from_str(body)?;
    let mut resources: Vec<ResourceStatus> = view
        .ui_resources
        .into_iter()
        .filter(|r| r.status.update_status != UpdateStatus::None)
        .map(UiResource::into_resource_status)
        .collect();
    // 排序：具名标签 A->Z >> 未打标签 >> Tiltfile；sort_by 为稳定排序，
    // 同组内保留发现顺序
    resources.sort_by(|a, b| a.label.sort_key().cmp(&b.label.sort_key()));
    Ok(resources)
}

/// 状态客户端：持有 HTTP 连接池和状态 URL
pub struct StatusClient {
    http: reqwest::Client,
    status_url: String,
}

impl StatusClient {
    /// 从配置创建客户端；客户端本身不设全局超时，超时按请求传入
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow!("cannot create HTTP client: {}", e))?;
        Ok(Self {
            http,
            status_url: config.status_url(),
        })
    }

    /// 状态 API 的完整 URL
    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// 拉取一次 Tilt 状态
    ///
    /// `timeout` 为 None 时不限时（稳态健康轮询）；可达性探测应传入
    /// 较短的超时，避免挂起的目标拖垮轮询循环。
    pub async fn fetch_status(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResourceStatus>, StatusError> {
        let mut request = self.http.get(&self.status_url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Protocol(format!(
                "status api returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StatusError::Protocol(format!("cannot read response body: {}", e)))?;

        let resources = parse_status_payload(&body)?;
        debug!(count = resources.len(), "fetched tilt status");
        Ok(resources)
    }
}

/// 传输错误分类：连接失败/超时说明 Tilt 没起，其余算协议错误
fn classify_transport_error(e: reqwest::Error) -> StatusError {
    if e.is_connect() || e.is_timeout() {
        StatusError::Unreachable(e.to_string())
    } else {
        StatusError::Protocol(e.to_string())
    }
}
