//! 响应报文重组
//!
//! PMAC 的响应有三种结束方式：
//! 1. `data<CR>data<CR>...<ACK>`：正常的单/多命令响应
//! 2. `<BELL>ERRxxx<CR>`：错误响应，不带 ACK
//! 3. `<STX>data<CR>`：单块响应
//!
//! 另外裸 LF 等同于 ACK。扫描器逐字节推进状态机，无论哪种结束方式，
//! 交给上层的报文都以 ACK 结尾。

use crate::frame::ascii::{ACK, BELL, CR, LF, STX};
use bytes::{BufMut, Bytes, BytesMut};

/// 扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Normal,
    /// 已见到 BELL/STX，下一个 CR 即结束
    ErrorLikely,
    Done,
}

/// 报文结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Ack,
    /// LF 被改写为 ACK
    LineFeed,
    /// BELL/STX 块在 CR 处结束，补了一个 ACK
    Block,
    /// 缓冲区写满，最后一个字节被改写为 ACK
    Truncated,
    /// 超时前未见到结束符
    Incomplete,
}

/// 逐字节重组器
#[derive(Debug)]
pub struct ReplyScanner {
    state: ScanState,
    buf: BytesMut,
    max_len: usize,
    termination: Option<Termination>,
    /// 截断发生在 BELL/STX 块内
    truncated_in_block: bool,
}

impl ReplyScanner {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            state: ScanState::Normal,
            buf: BytesMut::with_capacity(max_len),
            max_len,
            termination: None,
            truncated_in_block: false,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn truncated_in_block(&self) -> bool {
        self.truncated_in_block
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// 缓冲区剩余可用字节
    pub fn remaining(&self) -> usize {
        self.max_len.saturating_sub(self.buf.len())
    }

    /// 消费输入直到报文结束，返回已消费的字节数；结束符之后的字节不动。
    pub fn feed(&mut self, input: &[u8]) -> usize {
        let mut consumed = 0;
        for &byte in input {
            if self.is_done() {
                break;
            }
            consumed += 1;
            self.push(byte);
        }
        consumed
    }

    fn push(&mut self, byte: u8) {
        self.buf.put_u8(byte);
        match (self.state, byte) {
            (_, BELL) | (_, STX) => self.state = ScanState::ErrorLikely,
            (ScanState::ErrorLikely, CR) => {
                if self.buf.len() + 1 > self.max_len {
                    self.overwrite_last(ACK);
                } else {
                    self.buf.put_u8(ACK);
                }
                self.close(Termination::Block);
                return;
            }
            (_, ACK) => {
                self.close(Termination::Ack);
                return;
            }
            (_, LF) => {
                self.overwrite_last(ACK);
                self.close(Termination::LineFeed);
                return;
            }
            _ => {}
        }
        if self.buf.len() >= self.max_len {
            self.truncated_in_block = self.state == ScanState::ErrorLikely;
            self.overwrite_last(ACK);
            self.close(Termination::Truncated);
        }
    }

    fn overwrite_last(&mut self, byte: u8) {
        if let Some(last) = self.buf.last_mut() {
            *last = byte;
        }
    }

    fn close(&mut self, termination: Termination) {
        self.state = ScanState::Done;
        self.termination = Some(termination);
    }

    pub fn finish(self) -> Reply {
        Reply {
            data: self.buf.freeze(),
            termination: self.termination.unwrap_or(Termination::Incomplete),
        }
    }
}

/// 一条完整（或超时截断）的响应报文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    data: Bytes,
    termination: Termination,
}

impl Reply {
    pub fn new(data: Bytes, termination: Termination) -> Self {
        Self { data, termination }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn is_complete(&self) -> bool {
        self.termination != Termination::Incomplete
    }

    /// 去掉结尾 ACK 后的文本。
    pub fn text(&self) -> String {
        let body = match self.data.last() {
            Some(&ACK) => &self.data[..self.data.len() - 1],
            _ => &self.data[..],
        };
        String::from_utf8_lossy(body).into_owned()
    }

    /// 设备错误在报文中的位置。设备在出错的名字处停止应答，
    /// 之前的值仍按行返回，随后是 `<BELL>ERRxxx<CR>`。
    pub fn device_error_offset(&self) -> Option<usize> {
        self.data.iter().position(|&b| b == BELL)
    }

    pub fn is_device_error(&self) -> bool {
        self.device_error_offset().is_some()
    }

    /// 错误码，例如 `ERR003`。
    pub fn device_error_code(&self) -> Option<String> {
        let body = &self.data[self.device_error_offset()? + 1..];
        let end = body
            .iter()
            .position(|&b| b == CR || b == ACK)
            .unwrap_or(body.len());
        Some(String::from_utf8_lossy(&body[..end]).trim().to_string())
    }

    /// 设备错误之前已经应答的值，没有错误时等同于 [`Self::text`]。
    pub fn values_text(&self) -> String {
        match self.device_error_offset() {
            Some(offset) => String::from_utf8_lossy(&self.data[..offset]).into_owned(),
            None => self.text(),
        }
    }
}
