//! 内存中的 PMAC 设备模拟
//!
//! 解析写入的请求帧并按真实设备的方式应答：命令产生响应字节，
//! read-ready 回复两字节，get-buffer 放出被扣留的数据，flush 清空缓冲并回复 0x40。
//! 没有可读字节时读取立即返回超时，测试不需要真实等待。

use crate::error::ProtocolError;
use crate::frame::{RequestFrame, VR_DOWNLOAD, opcode};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// 命令应答函数：返回 `None` 表示设备不回复。
pub type Responder = Box<dyn FnMut(&str) -> Option<Vec<u8>> + Send>;

/// 设备收到的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub text: String,
    pub control: bool,
}

#[derive(Default)]
struct MemoryDevice {
    inbound: BytesMut,
    outbox: VecDeque<u8>,
    held: VecDeque<u8>,
    immediate_limit: Option<usize>,
    scripted: VecDeque<Option<Vec<u8>>>,
    responder: Option<Responder>,
    variables: HashMap<String, String>,
    frames: Vec<RequestFrame>,
    commands: Vec<SentCommand>,
    connected: bool,
    refuse_reconnect: bool,
    reconnects: usize,
}

impl MemoryDevice {
    fn handle(&mut self, frame: RequestFrame) {
        match frame.opcode {
            opcode::GET_RESPONSE => {
                let text = String::from_utf8_lossy(&frame.payload).into_owned();
                self.command(text, false);
            }
            opcode::CTRL_RESPONSE => {
                let text = char::from(frame.value as u8).to_string();
                self.command(text, true);
            }
            opcode::READ_READY => {
                let pending = u8::from(!self.held.is_empty());
                self.outbox.extend([pending, 0]);
            }
            opcode::GET_BUFFER => {
                let n = (frame.length as usize).min(self.held.len());
                let released: Vec<u8> = self.held.drain(..n).collect();
                self.outbox.extend(released);
            }
            opcode::FLUSH => {
                self.outbox.clear();
                self.held.clear();
                self.outbox.push_back(VR_DOWNLOAD);
            }
            _ => {}
        }
        self.frames.push(frame);
    }

    fn command(&mut self, text: String, control: bool) {
        let reply = match self.scripted.pop_front() {
            Some(scripted) => scripted,
            None => match self.responder.as_mut() {
                Some(responder) => responder(&text),
                None => Some(self.answer_from_variables(&text)),
            },
        };
        self.commands.push(SentCommand { text, control });
        if let Some(bytes) = reply {
            self.deliver(bytes);
        }
    }

    /// 按变量表应答：每个名字一行，ACK 结尾；遇到未知名字时在已应答的
    /// 值之后回复 ERR003 并停止。
    fn answer_from_variables(&self, text: &str) -> Vec<u8> {
        let mut reply = Vec::new();
        for name in text.split_whitespace() {
            match self.variables.get(name) {
                Some(value) => {
                    reply.extend_from_slice(value.as_bytes());
                    reply.push(b'\r');
                }
                None => {
                    reply.extend_from_slice(b"\x07ERR003\r");
                    return reply;
                }
            }
        }
        reply.push(0x06);
        reply
    }

    fn deliver(&mut self, bytes: Vec<u8>) {
        let immediate = self.immediate_limit.unwrap_or(usize::MAX).min(bytes.len());
        self.outbox.extend(&bytes[..immediate]);
        self.held.extend(&bytes[immediate..]);
    }
}

/// 可克隆的设备句柄：一份交给编解码器，其余留在测试里检查和操控。
#[derive(Clone)]
pub struct MemoryTransport {
    device: Arc<Mutex<MemoryDevice>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let device = MemoryDevice {
            connected: true,
            ..MemoryDevice::default()
        };
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// 设置变量表中的值。
    pub fn set_variable(&self, name: &str, value: &str) {
        self.device
            .lock()
            .variables
            .insert(name.to_string(), value.to_string());
    }

    /// 使用自定义应答函数替代变量表。
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&str) -> Option<Vec<u8>> + Send + 'static,
    {
        self.device.lock().responder = Some(Box::new(responder));
    }

    /// 为下一条命令预置应答，`None` 表示不回复。优先于应答函数和变量表。
    pub fn push_reply(&self, reply: Option<&[u8]>) {
        self.device
            .lock()
            .scripted
            .push_back(reply.map(<[u8]>::to_vec));
    }

    /// 每条响应只立即送出前 `limit` 字节，其余留到 get-buffer。
    pub fn set_immediate_limit(&self, limit: Option<usize>) {
        self.device.lock().immediate_limit = limit;
    }

    /// 直接注入待读字节。
    pub fn inject(&self, bytes: &[u8]) {
        self.device.lock().outbox.extend(bytes);
    }

    /// 模拟断线；`refuse_reconnect` 为 true 时重连也失败。
    pub fn disconnect(&self, refuse_reconnect: bool) {
        let mut device = self.device.lock();
        device.connected = false;
        device.refuse_reconnect = refuse_reconnect;
    }

    pub fn allow_reconnect(&self) {
        self.device.lock().refuse_reconnect = false;
    }

    pub fn is_connected(&self) -> bool {
        self.device.lock().connected
    }

    pub fn reconnect_count(&self) -> usize {
        self.device.lock().reconnects
    }

    pub fn sent_frames(&self) -> Vec<RequestFrame> {
        self.device.lock().frames.clone()
    }

    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.device.lock().commands.clone()
    }

    /// 只含文本命令（不含控制字符）。
    pub fn command_texts(&self) -> Vec<String> {
        self.device
            .lock()
            .commands
            .iter()
            .filter(|command| !command.control)
            .map(|command| command.text.clone())
            .collect()
    }

    pub fn clear_history(&self) {
        let mut device = self.device.lock();
        device.frames.clear();
        device.commands.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let mut device = self.device.lock();
        if !device.connected {
            return Err(ProtocolError::Connection("device disconnected".to_string()));
        }
        device.inbound.extend_from_slice(data);
        loop {
            let decoded = RequestFrame::decode(&device.inbound)?;
            let Some((frame, consumed)) = decoded else {
                break;
            };
            let _ = device.inbound.split_to(consumed);
            device.handle(frame);
        }
        Ok(data.len())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let mut device = self.device.lock();
        if !device.connected {
            return Err(ProtocolError::Connection("device disconnected".to_string()));
        }
        if device.outbox.is_empty() {
            return Err(ProtocolError::Timeout(format!(
                "no data within {}ms",
                timeout.as_millis()
            )));
        }
        let n = buf.len().min(device.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(device.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn reconnect(&mut self) -> Result<(), ProtocolError> {
        let mut device = self.device.lock();
        if device.refuse_reconnect {
            return Err(ProtocolError::Connection("reconnect refused".to_string()));
        }
        device.connected = true;
        device.reconnects += 1;
        device.inbound.clear();
        device.outbox.clear();
        device.held.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
