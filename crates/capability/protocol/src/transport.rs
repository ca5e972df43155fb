//! 传输层抽象
//!
//! 编解码器只依赖 [`Transport`]：写入一段字节、带超时读取、断线后重连。
//! 生产环境使用 [`TcpTransport`]，测试使用 [`crate::MemoryTransport`]。

use crate::error::ProtocolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// 字节传输通道
#[async_trait]
pub trait Transport: Send {
    /// 写入全部字节，返回写入数量。
    async fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError>;

    /// 读取至多 `buf.len()` 字节。
    ///
    /// - 截止时间内没有任何字节：`ProtocolError::Timeout`
    /// - 对端关闭：`ProtocolError::Connection`
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError>;

    /// 断线后重新建立连接。
    async fn reconnect(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// 用于日志的对端描述。
    fn describe(&self) -> String;
}

/// TCP 传输配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// 控制器地址
    pub host: String,
    /// 控制器端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_port() -> u16 {
    1025
}

fn default_connect_timeout() -> u64 {
    5000
}

impl TcpTransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout_ms: default_connect_timeout(),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 基于 TCP 的 PMAC 以太网连接
pub struct TcpTransport {
    config: TcpTransportConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// 建立连接。
    pub async fn connect(config: TcpTransportConfig) -> Result<Self, ProtocolError> {
        let mut transport = Self {
            config,
            stream: None,
        };
        transport.open().await?;
        Ok(transport)
    }

    /// 创建未连接的实例，首次使用前需 `reconnect`。
    pub fn detached(config: TcpTransportConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&mut self) -> Result<(), ProtocolError> {
        let addr = self.config.address();
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ProtocolError::Connection(format!(
                    "failed to connect to {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                return Err(ProtocolError::Connection(format!(
                    "connect to {} timed out after {}ms",
                    addr, self.config.connect_timeout_ms
                )));
            }
        };
        stream.set_nodelay(true)?;
        info!(target: "pmac.protocol", addr = %addr, "tcp_connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut TcpStream, ProtocolError> {
        self.stream
            .as_mut()
            .ok_or_else(|| ProtocolError::Connection("not connected".to_string()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let stream = self.stream()?;
        if let Err(e) = stream.write_all(data).await {
            self.stream = None;
            return Err(ProtocolError::Io(e));
        }
        Ok(data.len())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let stream = self.stream()?;
        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) if !buf.is_empty() => {
                warn!(target: "pmac.protocol", "tcp_peer_closed");
                self.stream = None;
                Err(ProtocolError::Connection("connection closed by peer".to_string()))
            }
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => {
                self.stream = None;
                Err(ProtocolError::Io(e))
            }
            Err(_) => Err(ProtocolError::Timeout(format!(
                "no data within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn reconnect(&mut self) -> Result<(), ProtocolError> {
        debug!(target: "pmac.protocol", addr = %self.config.address(), "tcp_reconnect");
        self.stream = None;
        self.open().await
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.config.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn config_defaults() {
        let config = TcpTransportConfig::from_json(r#"{"host":"10.0.0.5"}"#).unwrap();
        assert_eq!(config.port, 1025);
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.address(), "10.0.0.5:1025");
    }

    #[test]
    fn config_rejects_missing_host() {
        let err = TcpTransportConfig::from_json("{}").unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigParse(_)));
    }

    #[tokio::test]
    async fn read_times_out_then_reports_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"ok").await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            drop(socket);
        });

        let mut transport = TcpTransport::connect(TcpTransportConfig::new("127.0.0.1", port))
            .await
            .unwrap();
        assert_eq!(transport.write(b"ping").await.unwrap(), 4);

        let mut buf = [0u8; 16];
        let n = transport.read(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&buf[..n], b"ok");

        let err = transport
            .read(&mut buf, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let err = transport
            .read(&mut buf, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!transport.is_open());
        accept.await.unwrap();
    }
}
