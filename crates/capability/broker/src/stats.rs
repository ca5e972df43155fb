//! 事务统计

use std::time::Duration;

/// 连接建立以来的事务统计，成功和失败的事务都计入。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub messages: u64,
    pub failures: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub last_bytes_written: u64,
    pub last_bytes_read: u64,
    pub elapsed: Duration,
    pub last_elapsed: Duration,
}

impl TransactionStats {
    pub(crate) fn record(&mut self, written: usize, read: usize, elapsed: Duration, ok: bool) {
        self.messages += 1;
        if !ok {
            self.failures += 1;
        }
        self.last_bytes_written = written as u64;
        self.last_bytes_read = read as u64;
        self.bytes_written += self.last_bytes_written;
        self.bytes_read += self.last_bytes_read;
        self.last_elapsed = elapsed;
        self.elapsed += elapsed;
    }

    /// 平均事务耗时。
    pub fn average_elapsed(&self) -> Duration {
        if self.messages == 0 {
            return Duration::ZERO;
        }
        match u32::try_from(self.messages) {
            Ok(count) => self.elapsed / count,
            Err(_) => Duration::from_secs_f64(self.elapsed.as_secs_f64() / self.messages as f64),
        }
    }
}
