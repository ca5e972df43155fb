//! 追踪初始化、连接会话 ID 与进程级事务指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 事务指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub transactions: u64,
    pub transaction_failures: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub latency_ms_total: u64,
    pub latency_ms_count: u64,
    pub reply_mismatches: u64,
    pub device_errors: u64,
    pub reconnects: u64,
    pub suppressed_updates: u64,
}

impl MetricsSnapshot {
    /// 平均事务耗时（毫秒），没有样本时为 0。
    pub fn average_latency_ms(&self) -> u64 {
        if self.latency_ms_count == 0 {
            0
        } else {
            self.latency_ms_total / self.latency_ms_count
        }
    }
}

/// 事务指标。
pub struct TelemetryMetrics {
    transactions: AtomicU64,
    transaction_failures: AtomicU64,
    timeouts: AtomicU64,
    transport_errors: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    latency_ms_total: AtomicU64,
    latency_ms_count: AtomicU64,
    reply_mismatches: AtomicU64,
    device_errors: AtomicU64,
    reconnects: AtomicU64,
    suppressed_updates: AtomicU64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            transactions: AtomicU64::new(0),
            transaction_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            latency_ms_total: AtomicU64::new(0),
            latency_ms_count: AtomicU64::new(0),
            reply_mismatches: AtomicU64::new(0),
            device_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            suppressed_updates: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions: self.transactions.load(Ordering::Relaxed),
            transaction_failures: self.transaction_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            latency_ms_total: self.latency_ms_total.load(Ordering::Relaxed),
            latency_ms_count: self.latency_ms_count.load(Ordering::Relaxed),
            reply_mismatches: self.reply_mismatches.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            suppressed_updates: self.suppressed_updates.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 为一次物理连接生成会话 ID。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录一次成功事务的字节数与耗时。
pub fn record_transaction(bytes_written: u64, bytes_read: u64, latency_ms: u64) {
    let metrics = metrics();
    metrics.transactions.fetch_add(1, Ordering::Relaxed);
    metrics
        .bytes_written
        .fetch_add(bytes_written, Ordering::Relaxed);
    metrics.bytes_read.fetch_add(bytes_read, Ordering::Relaxed);
    metrics
        .latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics.latency_ms_count.fetch_add(1, Ordering::Relaxed);
}

/// 记录失败事务。
pub fn record_transaction_failure() {
    let metrics = metrics();
    metrics.transactions.fetch_add(1, Ordering::Relaxed);
    metrics
        .transaction_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录读取超时。
pub fn record_timeout() {
    metrics().timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录传输层断开。
pub fn record_transport_error() {
    metrics().transport_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录响应行数不一致。
pub fn record_reply_mismatch() {
    metrics().reply_mismatches.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备返回的 ERR 响应。
pub fn record_device_error() {
    metrics().device_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连成功次数。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录因状态读取抑制而跳过的层级更新。
pub fn record_suppressed_update() {
    metrics()
        .suppressed_updates
        .fetch_add(1, Ordering::Relaxed);
}
