//! 轮询调度
//!
//! 每个 fast 周期先检查连接，再依次刷新 PreFast 与 Fast；medium、slow
//! 周期到期时在同一轮中接着刷新。收到关闭信号后退出。

use crate::broker::MessageBroker;
use crate::error::BrokerError;
use domain::Tier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 调度周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// PreFast/Fast 周期（毫秒）
    #[serde(default = "default_fast_period")]
    pub fast_period_ms: u64,
    #[serde(default = "default_medium_period")]
    pub medium_period_ms: u64,
    #[serde(default = "default_slow_period")]
    pub slow_period_ms: u64,
}

fn default_fast_period() -> u64 {
    500
}

fn default_medium_period() -> u64 {
    2000
}

fn default_slow_period() -> u64 {
    5000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_period_ms: default_fast_period(),
            medium_period_ms: default_medium_period(),
            slow_period_ms: default_slow_period(),
        }
    }
}

impl SchedulerConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, BrokerError> {
        serde_json::from_str(json).map_err(|e| BrokerError::ConfigParse(e.to_string()))
    }
}

pub struct PollScheduler {
    broker: Arc<MessageBroker>,
    config: SchedulerConfig,
    last_medium: Option<Instant>,
    last_slow: Option<Instant>,
}

impl PollScheduler {
    pub fn new(broker: Arc<MessageBroker>, config: SchedulerConfig) -> Self {
        Self {
            broker,
            config,
            last_medium: None,
            last_slow: None,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// 运行直到 `shutdown` 变为 true 或发送端被丢弃。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.config.fast_period_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            target: "pmac.scheduler",
            fast_ms = self.config.fast_period_ms,
            medium_ms = self.config.medium_period_ms,
            slow_ms = self.config.slow_period_ms,
            "scheduler_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            self.run_cycle().await;
        }
        info!(target: "pmac.scheduler", "scheduler_stopped");
    }

    /// 执行一轮调度。
    pub async fn run_cycle(&mut self) {
        if !self.broker.check_connection().await {
            debug!(target: "pmac.scheduler", "cycle_skipped_disconnected");
            return;
        }

        for tier in [Tier::PreFast, Tier::Fast] {
            if !self.update(tier).await {
                return;
            }
        }

        let now = Instant::now();
        if due(self.last_medium, now, self.config.medium_period_ms) {
            self.last_medium = Some(now);
            if !self.update(Tier::Medium).await {
                return;
            }
        }
        if due(self.last_slow, now, self.config.slow_period_ms) {
            self.last_slow = Some(now);
            self.update(Tier::Slow).await;
        }
    }

    /// 返回本轮是否继续。
    async fn update(&self, tier: Tier) -> bool {
        match self.broker.update_variables(tier).await {
            Ok(()) => true,
            Err(err) if err.is_link_failure() => {
                warn!(target: "pmac.scheduler", tier = %tier, error = %err, "cycle_aborted");
                false
            }
            Err(err) => {
                debug!(
                    target: "pmac.scheduler",
                    tier = %tier,
                    error = %err,
                    "tier_update_degraded"
                );
                true
            }
        }
    }
}

fn due(last: Option<Instant>, now: Instant, period_ms: u64) -> bool {
    match last {
        None => true,
        Some(last) => now.duration_since(last) >= Duration::from_millis(period_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SchedulerConfig::from_json("{}").unwrap();
        assert_eq!(config.fast_period_ms, 500);
        assert_eq!(config.medium_period_ms, 2000);
        assert_eq!(config.slow_period_ms, 5000);
        let config = SchedulerConfig::from_json(r#"{"fast_period_ms":100}"#).unwrap();
        assert_eq!(config.fast_period_ms, 100);
    }

    #[test]
    fn first_cycle_is_always_due() {
        let now = Instant::now();
        assert!(due(None, now, 2000));
        assert!(!due(Some(now), now, 2000));
        assert!(due(Some(now), now + Duration::from_millis(2000), 2000));
    }
}
