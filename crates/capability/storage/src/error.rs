//! 存储层错误类型

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// 响应行数与命令中的变量数不一致；能对齐的部分已经写入。
    #[error("reply mismatch: expected {expected} values, received {received} (updated {updated})")]
    ProtocolMismatch {
        expected: usize,
        received: usize,
        updated: usize,
    },
}
