//! 自适应轮询节奏模块
//!
//! 两档节奏：Tilt 可达时用快档做健康检查，不可达时退到慢档做
//! 可达性探测，避免反复敲一个没起的目标。任一时刻只有一档生效，
//! 监控循环里唯一的 sleep 以 [`AdaptiveScheduler::period`] 为准。

use std::time::Duration;
use tracing::info;

/// 轮询节奏档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// 快档 - 目标可达，频繁健康检查
    Fast,
    /// 慢档 - 目标不可达，低频探测
    Slow,
}

/// 自适应调度器：按可达性在两档之间切换
#[derive(Debug)]
pub struct AdaptiveScheduler {
    fast: Duration,
    slow: Duration,
    cadence: Cadence,
}

impl AdaptiveScheduler {
    /// 创建调度器，初始为慢档（监控初始状态是 Down）
    pub fn new(fast: Duration, slow: Duration) -> Self {
        Self {
            fast,
            slow,
            cadence: Cadence::Slow,
        }
    }

    /// 当前生效的档位
    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// 当前档位的轮询周期
    pub fn period(&self) -> Duration {
        match self.cadence {
            Cadence::Fast => self.fast,
            Cadence::Slow => self.slow,
        }
    }

    /// 可达性变化时切换档位，返回是否真的切换了
    ///
    /// 请求的档位已经生效时是幂等的 no-op。
    pub fn reachability_changed(&mut self, reachable: bool) -> bool {
        let want = if reachable { Cadence::Fast } else { Cadence::Slow };
        if want == self.cadence {
            return false;
        }
        self.cadence = want;
        info!(
            interval_secs = self.period().as_secs(),
            "set health check timer"
        );
        true
    }
}
