//! 轮询引擎共享的领域类型：更新层级、连接状态与有序键值表。

pub mod kvstore;
pub mod tier;

pub use kvstore::KvStore;
pub use tier::{ConnectionState, ConnectionStatus, ParseTierError, Tier};
