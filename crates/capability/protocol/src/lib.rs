//! # PMAC 协议能力模块
//!
//! 把 ASCII 命令包装成以太网请求帧，并把无固定边界的响应字节流重组为完整报文。
//!
//! ## 架构
//!
//! ```text
//! MessageBroker
//!       │  write_read("P1 P2 M100")
//!       ▼
//! PmacCodec ── RequestFrame::encode ──▶ Transport (TcpTransport / MemoryTransport)
//!       ▲                                      │
//!       └──── ReplyScanner ◀── 响应字节 ────────┘
//! ```
//!
//! ## 响应结束方式
//!
//! - `data<CR>...<ACK>`
//! - `<BELL>ERRnnn<CR>`（补一个 ACK）
//! - `<STX>data<CR>`（补一个 ACK）
//! - `data<LF>`（LF 改写为 ACK）

mod codec;
mod error;
pub mod frame;
mod memory;
mod reply;
mod transport;

pub use codec::{CodecConfig, Exchange, PmacCodec};
pub use error::ProtocolError;
pub use frame::RequestFrame;
pub use memory::{MemoryTransport, Responder, SentCommand};
pub use reply::{Reply, ReplyScanner, ScanState, Termination};
pub use transport::{TcpTransport, TcpTransportConfig, Transport};
