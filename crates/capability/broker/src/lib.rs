//! # PMAC 变量轮询代理
//!
//! ```text
//! PollScheduler ──▶ MessageBroker::update_variables(tier)
//!                        │ 外部锁（注册顺序）→ 代理锁
//!                        ▼
//!                   CommandStore::command_strings
//!                        │
//!                        ▼
//!                   PmacCodec::write_read ──▶ 设备
//!                        │
//!                        ▼
//!                   CommandStore::update_chunk → CallbackStore::notify_all
//! ```
//!
//! 四个层级由快到慢：PreFast、Fast、Medium、Slow。PreFast 与 Fast 同周期，
//! 同一轮中 PreFast 先完成。事务失败时代理切换为断开，下一轮先用空命令探测恢复。

mod broker;
mod error;
mod scheduler;
mod stats;

pub use broker::{BrokerBuilder, ExternalLock, MessageBroker, SUPPRESSED_FAST_DIVISOR, TierUpdate};
pub use error::BrokerError;
pub use scheduler::{PollScheduler, SchedulerConfig};
pub use stats::TransactionStats;
