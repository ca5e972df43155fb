//! 调度层错误类型

use pmac_protocol::ProtocolError;
use pmac_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// 截止时间内（含探测重读）没有收到任何字节
    #[error("timeout: {0}")]
    Timeout(String),
    /// 连接被重置或关闭
    #[error("transport error: {0}")]
    Transport(String),
    /// 帧或配置错误
    #[error("protocol error: {0}")]
    Protocol(String),
    /// 响应行数与变量数不一致，已按位置尽量写入
    #[error(transparent)]
    ProtocolMismatch(#[from] StoreError),
    /// 设备返回 ERR 响应
    #[error("device error: {0}")]
    Device(String),
    /// 未连接，请求没有发出
    #[error("not connected")]
    Disconnected,
    #[error("config parse error: {0}")]
    ConfigParse(String),
}

impl BrokerError {
    /// 是否说明链路已断开。
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            BrokerError::Timeout(_)
                | BrokerError::Transport(_)
                | BrokerError::Protocol(_)
                | BrokerError::Disconnected
        )
    }
}

impl From<ProtocolError> for BrokerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Timeout(message) => BrokerError::Timeout(message),
            ProtocolError::Connection(message) => BrokerError::Transport(message),
            ProtocolError::Io(err) => BrokerError::Transport(err.to_string()),
            ProtocolError::Frame(message) | ProtocolError::ConfigParse(message) => {
                BrokerError::Protocol(message)
            }
        }
    }
}
