use std::fmt;
use std::str::FromStr;

/// 变量更新层级（由快到慢）。
///
/// PreFast 与 Fast 同周期，但同一轮中 PreFast 必须先于 Fast 完成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    PreFast,
    Fast,
    Medium,
    Slow,
}

impl Tier {
    /// 全部层级，按调度顺序排列。
    pub const ALL: [Tier; 4] = [Tier::PreFast, Tier::Fast, Tier::Medium, Tier::Slow];

    /// 层级在数组中的下标。
    pub fn index(self) -> usize {
        match self {
            Tier::PreFast => 0,
            Tier::Fast => 1,
            Tier::Medium => 2,
            Tier::Slow => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::PreFast => "prefast",
            Tier::Fast => "fast",
            Tier::Medium => "medium",
            Tier::Slow => "slow",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 层级名称解析失败。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTierError(pub String);

impl fmt::Display for ParseTierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tier: {}", self.0)
    }
}

impl std::error::Error for ParseTierError {}

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prefast" | "pre_fast" | "pre-fast" => Ok(Tier::PreFast),
            "fast" => Ok(Tier::Fast),
            "medium" => Ok(Tier::Medium),
            "slow" => Ok(Tier::Slow),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

/// 物理连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// 对外报告的连接状态。
///
/// `new_connection` 为一次性标志：连接恢复后第一次查询时为 true，
/// 消费者据此重新同步已发布的参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub new_connection: bool,
}
