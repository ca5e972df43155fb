//! # PMAC 变量存储模块
//!
//! - [`CommandStore`]：变量名 → 最近一次读取值，按插入顺序拼出合并读取命令，
//!   并把多行响应按位置拆回到各变量上
//! - [`CallbackStore`]：每个层级一份的回调列表，层级刷新后依次通知
//!
//! 每个层级持有独立的实例，变量不会在层级之间共享。

mod callback;
mod command;
mod error;

pub use callback::{CallbackStore, UpdateCallback};
pub use command::{CommandStore, MAX_REQUESTS_PER_COMMAND};
pub use error::StoreError;
