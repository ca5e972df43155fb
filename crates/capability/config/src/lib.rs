//! 应用运行配置加载。

use domain::Tier;
use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pmac_host: String,
    pub pmac_port: u16,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_reply_bytes: usize,
    pub flush_before_write: bool,
    pub fast_period_ms: u64,
    pub medium_period_ms: u64,
    pub slow_period_ms: u64,
    pub monitor_prefast: Vec<String>,
    pub monitor_fast: Vec<String>,
    pub monitor_medium: Vec<String>,
    pub monitor_slow: Vec<String>,
    pub stats_interval_seconds: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let pmac_host =
            env::var("PMAC_HOST").map_err(|_| ConfigError::Missing("PMAC_HOST".to_string()))?;
        if pmac_host.trim().is_empty() {
            return Err(ConfigError::Invalid("PMAC_HOST".to_string(), pmac_host));
        }
        let pmac_port = read_u16_with_default("PMAC_PORT", 1025)?;
        let timeout_ms = read_positive_u64("PMAC_TIMEOUT_MS", 5000)?;
        let connect_timeout_ms = read_positive_u64("PMAC_CONNECT_TIMEOUT_MS", 5000)?;
        let max_reply_bytes = read_positive_u64("PMAC_MAX_REPLY_BYTES", 1024)? as usize;
        let flush_before_write = read_bool_with_default("PMAC_FLUSH_BEFORE_WRITE", true);
        let fast_period_ms = read_positive_u64("PMAC_FAST_PERIOD_MS", 500)?;
        let medium_period_ms = read_positive_u64("PMAC_MEDIUM_PERIOD_MS", 2000)?;
        let slow_period_ms = read_positive_u64("PMAC_SLOW_PERIOD_MS", 5000)?;
        let stats_interval_seconds = read_u64_with_default("PMAC_STATS_INTERVAL_SECONDS", 30)?;

        Ok(Self {
            pmac_host,
            pmac_port,
            timeout_ms,
            connect_timeout_ms,
            max_reply_bytes,
            flush_before_write,
            fast_period_ms,
            medium_period_ms,
            slow_period_ms,
            monitor_prefast: read_list("PMAC_MONITOR_PREFAST"),
            monitor_fast: read_list("PMAC_MONITOR_FAST"),
            monitor_medium: read_list("PMAC_MONITOR_MEDIUM"),
            monitor_slow: read_list("PMAC_MONITOR_SLOW"),
            stats_interval_seconds,
        })
    }

    /// 某个层级配置的监视变量。
    pub fn monitor_variables(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::PreFast => &self.monitor_prefast,
            Tier::Fast => &self.monitor_fast,
            Tier::Medium => &self.monitor_medium,
            Tier::Slow => &self.monitor_slow,
        }
    }
}

/// 空白分隔的变量列表。
pub fn split_variable_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn read_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|value| split_variable_list(&value))
        .unwrap_or_default()
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 周期与超时不能为 0。
fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_list_ignores_extra_whitespace() {
        assert_eq!(
            split_variable_list("  #1P  #2P\t&2Q87 "),
            vec!["#1P".to_string(), "#2P".to_string(), "&2Q87".to_string()]
        );
        assert!(split_variable_list("   ").is_empty());
    }
}
