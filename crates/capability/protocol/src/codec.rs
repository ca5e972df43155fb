//! PMAC 以太网事务编解码器
//!
//! 一次事务 = 发送一帧命令 + 重组一条完整响应。首次读取直接等待设备回复；
//! 超时且没有任何字节时发 read-ready 探测，设备确有数据再发 get-buffer
//! 并重读一次。响应未结束时，后续每次读取前都先探测并取缓存。

use crate::error::ProtocolError;
use crate::frame::ascii::{ACK, BELL, CR, LF, STX};
use crate::frame::{ETHERNET_DATA_SIZE, MAX_READ_CHUNK, RequestFrame};
use crate::reply::{Reply, ReplyScanner, Termination};
use crate::transport::Transport;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 编解码器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// 单次读取超时（毫秒）
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// 单条响应最大字节数
    #[serde(default = "default_max_reply_bytes")]
    pub max_reply_bytes: usize,
    /// 发送命令前先清空设备缓冲
    #[serde(default = "default_flush_before_write")]
    pub flush_before_write: bool,
}

fn default_timeout() -> u64 {
    5000
}

fn default_max_reply_bytes() -> usize {
    1024
}

fn default_flush_before_write() -> bool {
    true
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            max_reply_bytes: default_max_reply_bytes(),
            flush_before_write: default_flush_before_write(),
        }
    }
}

impl CodecConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// 一次写读事务的结果
#[derive(Debug, Clone)]
pub struct Exchange {
    pub bytes_written: usize,
    pub reply: Reply,
}

impl Exchange {
    pub fn bytes_read(&self) -> usize {
        self.reply.len()
    }
}

/// 被截断响应的剩余部分，丢弃到它自己的结束符为止。
#[derive(Debug, Clone, Copy)]
struct TruncatedTail {
    in_block: bool,
}

impl TruncatedTail {
    /// 返回结束符之后的偏移；输入里没有结束符时返回 `None`。
    fn skip(&mut self, input: &[u8]) -> Option<usize> {
        for (i, &byte) in input.iter().enumerate() {
            match byte {
                BELL | STX => self.in_block = true,
                CR if self.in_block => return Some(i + 1),
                ACK | LF => return Some(i + 1),
                _ => {}
            }
        }
        None
    }
}

pub struct PmacCodec {
    transport: Box<dyn Transport>,
    config: CodecConfig,
    /// 上一条响应结束符之后收到的字节
    pending: BytesMut,
    truncated_tail: Option<TruncatedTail>,
    last_written: usize,
}

impl PmacCodec {
    pub fn new(transport: Box<dyn Transport>, config: CodecConfig) -> Self {
        Self {
            transport,
            config,
            pending: BytesMut::new(),
            truncated_tail: None,
            last_written: 0,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// 未消费的缓存字节数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 最近一次 [`Self::write_read`] 实际发出的命令字节数，未写出时为 0。
    pub fn last_bytes_written(&self) -> usize {
        self.last_written
    }

    /// 发送一条命令，返回计入统计的命令字节数。
    ///
    /// 单个控制字符走 CTRL_RESPONSE 帧，其余走 GETRESPONSE 帧。
    pub async fn write_command(&mut self, command: &[u8]) -> Result<usize, ProtocolError> {
        let frame = if RequestFrame::is_control_character(command) {
            RequestFrame::control(command[0])
        } else {
            if command.len() > ETHERNET_DATA_SIZE {
                warn!(
                    target: "pmac.protocol",
                    len = command.len(),
                    max = ETHERNET_DATA_SIZE,
                    "command_truncated"
                );
            }
            RequestFrame::command(command)
        };
        trace!(
            target: "pmac.protocol",
            opcode = frame.opcode,
            len = frame.payload.len(),
            "frame_out"
        );
        self.transport.write(&frame.encode()).await?;
        Ok(command.len().min(ETHERNET_DATA_SIZE))
    }

    /// 单次读取，超时后探测并取缓存重读一次。
    pub async fn read_response(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ProtocolError> {
        match self.transport.read(buf, timeout).await {
            Ok(n) if n > 0 => return Ok(n),
            Ok(_) => {}
            Err(e) if e.is_timeout() => {}
            Err(e) => return Err(e),
        }

        if !self.read_ready().await? {
            return Err(ProtocolError::Timeout(format!(
                "no reply within {}ms and nothing pending",
                timeout.as_millis()
            )));
        }
        debug!(target: "pmac.protocol", "reply_pending_after_timeout");
        self.send_get_buffer(buf.len()).await?;
        match self.transport.read(buf, timeout).await {
            Ok(n) if n > 0 => Ok(n),
            Ok(_) => Err(ProtocolError::Timeout("empty retry read".to_string())),
            Err(e) => Err(e),
        }
    }

    /// 询问设备是否有待读数据。回复两字节，首字节非零表示有数据。
    pub async fn read_ready(&mut self) -> Result<bool, ProtocolError> {
        self.transport.write(&RequestFrame::read_ready().encode()).await?;
        let mut answer = [0u8; 2];
        let mut filled = 0;
        while filled < answer.len() {
            match self
                .transport
                .read(&mut answer[filled..], self.config.timeout())
                .await
            {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(filled == answer.len() && answer[0] != 0)
    }

    /// 请求设备送出缓存的响应数据。
    pub async fn send_get_buffer(&mut self, max_bytes: usize) -> Result<(), ProtocolError> {
        self.transport
            .write(&RequestFrame::get_buffer(max_bytes).encode())
            .await?;
        Ok(())
    }

    /// 清空设备缓冲。确认字节的内容不做检查，本地缓存总是被清空。
    pub async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.pending.clear();
        self.truncated_tail = None;
        self.transport.write(&RequestFrame::flush().encode()).await?;
        let mut ack = [0u8; 1];
        match self.transport.read(&mut ack, self.config.timeout()).await {
            Ok(_) => {}
            Err(e) if e.is_timeout() => {
                debug!(target: "pmac.protocol", "flush_ack_missing");
            }
            Err(e) => return Err(e),
        }
        self.pending.clear();
        Ok(())
    }

    /// 读取一条完整响应。
    ///
    /// 已有字节但后续读取超时时返回不完整的响应（`Termination::Incomplete`），
    /// 一个字节都没有时返回 `Timeout`。
    pub async fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        let timeout = self.config.timeout();
        let mut scanner = ReplyScanner::new(self.config.max_reply_bytes);

        if !self.pending.is_empty() {
            let pending = self.pending.split();
            self.absorb(&mut scanner, &pending);
        }

        let mut chunk = vec![0u8; MAX_READ_CHUNK];
        let mut first = true;
        while !scanner.is_done() {
            let result = if first {
                self.read_response(&mut chunk, timeout).await
            } else {
                self.read_more(&mut chunk, timeout).await
            };
            first = false;

            match result {
                Ok(n) => self.absorb(&mut scanner, &chunk[..n]),
                Err(e) if e.is_timeout() && !scanner.is_empty() => {
                    warn!(
                        target: "pmac.protocol",
                        received = scanner.len(),
                        "reply_incomplete"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scanner.finish())
    }

    /// 把收到的字节交给扫描器，结束符之后的部分留到下一条响应。
    /// 响应被截断时，它的剩余部分不会留给下一条。
    fn absorb(&mut self, scanner: &mut ReplyScanner, input: &[u8]) {
        let Some(input) = self.skip_truncated_tail(input) else {
            return;
        };
        let consumed = scanner.feed(input);
        let mut leftover = &input[consumed..];
        if scanner.termination() == Some(Termination::Truncated) {
            warn!(
                target: "pmac.protocol",
                max = self.config.max_reply_bytes,
                "reply_truncated"
            );
            self.truncated_tail = Some(TruncatedTail {
                in_block: scanner.truncated_in_block(),
            });
            leftover = self.skip_truncated_tail(leftover).unwrap_or_default();
        }
        self.pending.extend_from_slice(leftover);
    }

    /// 丢弃上一条截断响应的剩余字节，返回其后的输入。
    /// 剩余部分还没收完时返回 `None`。
    fn skip_truncated_tail<'a>(&mut self, input: &'a [u8]) -> Option<&'a [u8]> {
        let Some(tail) = self.truncated_tail.as_mut() else {
            return Some(input);
        };
        let end = tail.skip(input)?;
        self.truncated_tail = None;
        debug!(target: "pmac.protocol", discarded = end, "truncated_tail_discarded");
        Some(&input[end..])
    }

    async fn read_more(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ProtocolError> {
        if self.read_ready().await? {
            self.send_get_buffer(buf.len()).await?;
        }
        self.read_response(buf, timeout).await
    }

    /// 发送命令并读取完整响应。
    pub async fn write_read(&mut self, command: &[u8]) -> Result<Exchange, ProtocolError> {
        self.last_written = 0;
        if self.config.flush_before_write {
            self.flush().await?;
        }
        let bytes_written = self.write_command(command).await?;
        self.last_written = bytes_written;
        let reply = self.read_reply().await?;
        Ok(Exchange {
            bytes_written,
            reply,
        })
    }

    /// 重建传输连接，丢弃本地缓存。
    pub async fn reconnect(&mut self) -> Result<(), ProtocolError> {
        self.pending.clear();
        self.truncated_tail = None;
        self.transport.reconnect().await
    }
}
