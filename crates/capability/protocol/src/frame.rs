//! PMAC 以太网请求帧
//!
//! ```text
//! ┌───────────┬─────────┬────────┬────────┬────────┬──────────────┐
//! │ Direction │ Opcode  │ wValue │ wIndex │ wLength│ Payload      │
//! │ 1 byte    │ 1 byte  │ u16 BE │ u16 BE │ u16 BE │ 0..1492 bytes│
//! └───────────┴─────────┴────────┴────────┴────────┴──────────────┘
//! ```
//!
//! 只有发送命令帧携带 payload；read-ready 与 get-buffer 的 wLength
//! 表示期望的返回长度，不跟随数据。

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// 帧头长度
pub const HEADER_SIZE: usize = 8;

/// 单帧最大 payload（以太网 MTU）
pub const ETHERNET_DATA_SIZE: usize = 1492;

/// 单次读取的最大响应块，超过需再次 get-buffer
pub const MAX_READ_CHUNK: usize = 1400;

/// 方向码
pub const VR_UPLOAD: u8 = 0xC0;
pub const VR_DOWNLOAD: u8 = 0x40;

/// 请求码
pub mod opcode {
    pub const SEND_LINE: u8 = 0xB0;
    pub const GET_LINE: u8 = 0xB1;
    pub const FLUSH: u8 = 0xB3;
    pub const GET_RESPONSE: u8 = 0xBF;
    pub const READ_READY: u8 = 0xC2;
    pub const CTRL_RESPONSE: u8 = 0xC4;
    pub const GET_BUFFER: u8 = 0xC5;
    pub const WRITE_BUFFER: u8 = 0xC6;
}

/// 响应流中的控制字节
pub mod ascii {
    pub const STX: u8 = 0x02;
    pub const ACK: u8 = 0x06;
    pub const BELL: u8 = 0x07;
    pub const LF: u8 = 0x0A;
    pub const CR: u8 = 0x0D;
}

/// 通过 CTRL_RESPONSE 帧发送的单字符命令：^B ^C ^F ^G ^P ^V
pub const CONTROL_CHARACTERS: [u8; 6] = [0x02, 0x03, 0x06, 0x07, 0x10, 0x16];

/// 请求帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub direction: u8,
    pub opcode: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
    pub payload: Bytes,
}

impl RequestFrame {
    /// ASCII 命令帧（GETRESPONSE）。超过 MTU 的部分被截断。
    pub fn command(text: &[u8]) -> Self {
        let len = text.len().min(ETHERNET_DATA_SIZE);
        Self {
            direction: VR_DOWNLOAD,
            opcode: opcode::GET_RESPONSE,
            value: 0,
            index: 0,
            length: len as u16,
            payload: Bytes::copy_from_slice(&text[..len]),
        }
    }

    /// 单控制字符帧，字符放在 wValue 中。
    pub fn control(character: u8) -> Self {
        Self {
            direction: VR_UPLOAD,
            opcode: opcode::CTRL_RESPONSE,
            value: u16::from(character),
            index: 0,
            length: 0,
            payload: Bytes::new(),
        }
    }

    /// 查询设备端是否有待读数据，设备回复 2 字节。
    pub fn read_ready() -> Self {
        Self {
            direction: VR_UPLOAD,
            opcode: opcode::READ_READY,
            value: 0,
            index: 0,
            length: 2,
            payload: Bytes::new(),
        }
    }

    /// 取回设备端缓存的响应数据。
    pub fn get_buffer(max_bytes: usize) -> Self {
        Self {
            direction: VR_UPLOAD,
            opcode: opcode::GET_BUFFER,
            value: 0,
            index: 0,
            length: max_bytes.min(u16::MAX as usize) as u16,
            payload: Bytes::new(),
        }
    }

    /// 清空设备端缓冲，设备回复 1 字节确认。
    pub fn flush() -> Self {
        Self {
            direction: VR_DOWNLOAD,
            opcode: opcode::FLUSH,
            value: 0,
            index: 0,
            length: 0,
            payload: Bytes::new(),
        }
    }

    /// 是否应作为控制字符帧发送。
    pub fn is_control_character(data: &[u8]) -> bool {
        data.len() == 1 && CONTROL_CHARACTERS.contains(&data[0])
    }

    fn carries_payload(code: u8) -> bool {
        matches!(
            code,
            opcode::GET_RESPONSE | opcode::SEND_LINE | opcode::WRITE_BUFFER
        )
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.direction);
        buf.put_u8(self.opcode);
        buf.put_u16(self.value);
        buf.put_u16(self.index);
        buf.put_u16(self.length);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// 从字节流头部解出一帧。
    ///
    /// - `Ok(Some((frame, consumed)))`：完整帧
    /// - `Ok(None)`：数据不足
    /// - `Err(..)`：payload 长度超过 MTU
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut header = &data[..HEADER_SIZE];
        let direction = header.get_u8();
        let opcode = header.get_u8();
        let value = header.get_u16();
        let index = header.get_u16();
        let length = header.get_u16();

        let payload_len = if Self::carries_payload(opcode) {
            length as usize
        } else {
            0
        };
        if payload_len > ETHERNET_DATA_SIZE {
            return Err(ProtocolError::Frame(format!(
                "payload length {} exceeds {}",
                payload_len, ETHERNET_DATA_SIZE
            )));
        }
        let total = HEADER_SIZE + payload_len;
        if data.len() < total {
            return Ok(None);
        }
        let frame = Self {
            direction,
            opcode,
            value,
            index,
            length,
            payload: Bytes::copy_from_slice(&data[HEADER_SIZE..total]),
        };
        Ok(Some((frame, total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_layout() {
        let frame = RequestFrame::command(b"#1P");
        let encoded = frame.encode();
        assert_eq!(
            encoded.as_ref(),
            &[0x40u8, 0xBF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, b'#', b'1', b'P']
        );
    }

    #[test]
    fn length_is_big_endian() {
        let text = vec![b'I'; 300];
        let encoded = RequestFrame::command(&text).encode();
        assert_eq!(&encoded[6..8], &[0x01u8, 0x2C]);
        assert_eq!(encoded.len(), HEADER_SIZE + 300);
    }

    #[test]
    fn oversized_command_is_truncated() {
        let text = vec![b'M'; ETHERNET_DATA_SIZE + 10];
        let frame = RequestFrame::command(&text);
        assert_eq!(frame.payload.len(), ETHERNET_DATA_SIZE);
        assert_eq!(frame.length as usize, ETHERNET_DATA_SIZE);
    }

    #[test]
    fn control_character_in_value_field() {
        assert!(RequestFrame::is_control_character(&[0x03]));
        assert!(!RequestFrame::is_control_character(b"P"));
        assert!(!RequestFrame::is_control_character(&[0x03, 0x03]));
        let encoded = RequestFrame::control(0x10).encode();
        assert_eq!(encoded.as_ref(), &[0xC0u8, 0xC4, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_waits_for_payload() {
        let encoded = RequestFrame::command(b"I130").encode();
        assert!(RequestFrame::decode(&encoded[..10]).unwrap().is_none());
        let (frame, consumed) = RequestFrame::decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.payload.as_ref(), b"I130");
    }

    #[test]
    fn decode_get_buffer_has_no_payload() {
        let encoded = RequestFrame::get_buffer(1400).encode();
        let (frame, consumed) = RequestFrame::decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(frame.length, 1400);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let header = [0x40, 0xBF, 0, 0, 0, 0, 0x10, 0x00];
        assert!(RequestFrame::decode(&header).is_err());
    }
}
