//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接断开或未建立
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时：截止时间内没有收到任何字节
    #[error("timeout: {0}")]
    Timeout(String),

    /// 帧格式错误
    #[error("frame error: {0}")]
    Frame(String),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),
}

impl ProtocolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout(_))
    }

    /// 传输层断开（不重试）。
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Connection(_) | ProtocolError::Io(_))
    }
}
