//! 消息代理
//!
//! 独占唯一的设备连接，所有线上事务都在一个 `tokio::sync::Mutex` 下串行执行。
//! 层级刷新时先按注册顺序获取外部锁，再获取代理自身的锁，结束后逆序释放，
//! 消费者看到的状态与计算它的数据一起变化。

use crate::error::BrokerError;
use crate::stats::TransactionStats;
use domain::{ConnectionState, ConnectionStatus, Tier};
use pmac_protocol::{CodecConfig, PmacCodec, Reply, Transport};
use pmac_storage::{CallbackStore, CommandStore, StoreError, UpdateCallback};
use pmac_telemetry::{
    new_session_id, record_device_error, record_reconnect, record_reply_mismatch,
    record_suppressed_update, record_timeout, record_transaction, record_transaction_failure,
    record_transport_error,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// 外部消费者持有的锁句柄。
pub type ExternalLock = Arc<Mutex<()>>;

/// 抑制状态读取时 Fast 层级每隔多少次调用执行一次。
pub const SUPPRESSED_FAST_DIVISOR: u32 = 4;

/// 一次层级刷新完成的记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierUpdate {
    /// 全局递增的完成序号，可用于比较不同层级的先后
    pub sequence: u64,
    pub completed_at: Instant,
    pub duration: Duration,
}

#[derive(Default)]
struct TierState {
    store: CommandStore,
    callbacks: CallbackStore,
    last_update: Option<TierUpdate>,
}

struct BrokerInner {
    codec: PmacCodec,
    tiers: [TierState; 4],
    state: ConnectionState,
    new_connection: bool,
    session_id: String,
    suppress: bool,
    suppress_counter: u32,
    stats: TransactionStats,
    update_time: Duration,
    sequence: u64,
}

/// 构造 [`MessageBroker`]。外部锁只能在这里注册。
pub struct BrokerBuilder {
    codec: PmacCodec,
    locks: Vec<ExternalLock>,
    connected: bool,
}

impl BrokerBuilder {
    pub fn new(transport: Box<dyn Transport>, config: CodecConfig) -> Self {
        Self {
            codec: PmacCodec::new(transport, config),
            locks: Vec::new(),
            connected: true,
        }
    }

    /// 注册外部锁，按注册顺序获取。
    pub fn register_lock(mut self, lock: ExternalLock) -> Self {
        self.locks.push(lock);
        self
    }

    /// 传输尚未连通，首次连接检查时再建立。
    pub fn start_disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn build(self) -> MessageBroker {
        let state = if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let session_id = new_session_id();
        info!(
            target: "pmac.broker",
            session_id = %session_id,
            peer = %self.codec.describe(),
            connected = self.connected,
            external_locks = self.locks.len(),
            "broker_created"
        );
        MessageBroker {
            inner: Mutex::new(BrokerInner {
                codec: self.codec,
                tiers: Default::default(),
                state,
                new_connection: self.connected,
                session_id,
                suppress: false,
                suppress_counter: 0,
                stats: TransactionStats::default(),
                update_time: Duration::ZERO,
                sequence: 0,
            }),
            locks: self.locks,
        }
    }
}

pub struct MessageBroker {
    inner: Mutex<BrokerInner>,
    locks: Vec<ExternalLock>,
}

impl MessageBroker {
    pub fn builder(transport: Box<dyn Transport>, config: CodecConfig) -> BrokerBuilder {
        BrokerBuilder::new(transport, config)
    }

    /// 在层级中注册变量。
    pub async fn add_read_variable(&self, tier: Tier, name: &str) {
        let mut inner = self.inner.lock().await;
        inner.tiers[tier.index()].store.add_item(name);
    }

    /// 注册空白分隔的变量列表，返回列表中的变量数。
    pub async fn add_monitor_variables(&self, tier: Tier, variables: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let store = &mut inner.tiers[tier.index()].store;
        let mut count = 0;
        for name in variables.split_whitespace() {
            store.add_item(name);
            count += 1;
        }
        count
    }

    /// 注销变量，返回是否存在。
    pub async fn remove_read_variable(&self, tier: Tier, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.tiers[tier.index()].store.delete_item(name)
    }

    pub async fn register_for_updates(&self, callback: Arc<dyn UpdateCallback>, tier: Tier) {
        let mut inner = self.inner.lock().await;
        inner.tiers[tier.index()].callbacks.register(callback);
    }

    /// 绕过层级直接执行一条命令，返回去掉 ACK 的响应文本。
    pub async fn immediate_write_read(&self, command: &str) -> Result<String, BrokerError> {
        let mut inner = self.inner.lock().await;
        let reply = inner.transact(command).await?;
        if reply.is_device_error() {
            record_device_error();
            warn!(
                target: "pmac.broker",
                command = %command,
                code = ?reply.device_error_code(),
                "device_error_reply"
            );
        }
        Ok(reply.text())
    }

    /// 刷新一个层级：发送合并命令、拆分响应、通知回调。
    ///
    /// 抑制状态读取时被跳过的调用返回 `Ok(())`。
    pub async fn update_variables(&self, tier: Tier) -> Result<(), BrokerError> {
        let mut guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(self.locks.len());
        for lock in &self.locks {
            guards.push(lock.lock().await);
        }

        let result = {
            let mut inner = self.inner.lock().await;
            if inner.suppressed(tier) {
                record_suppressed_update();
                debug!(target: "pmac.broker", tier = %tier, "tier_update_suppressed");
                Ok(())
            } else {
                inner.update_tier(tier).await
            }
        };

        while let Some(guard) = guards.pop() {
            drop(guard);
        }
        result
    }

    /// 按 PreFast、Fast、Medium、Slow 顺序全部刷新一次，返回第一个错误。
    pub async fn poll_all_now(&self) -> Result<(), BrokerError> {
        let mut first_error = None;
        for tier in Tier::ALL {
            if let Err(err) = self.update_variables(tier).await {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 检查连接，断开时尝试重连。不消费新连接标志。
    pub async fn check_connection(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.ensure_connected().await
    }

    /// 返回连接状态；新连接标志只在已连接时报告一次。
    pub async fn get_connected_status(&self) -> ConnectionStatus {
        let mut inner = self.inner.lock().await;
        let connected = inner.ensure_connected().await;
        let new_connection = connected && inner.new_connection;
        if new_connection {
            inner.new_connection = false;
        }
        ConnectionStatus {
            connected,
            new_connection,
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn session_id(&self) -> String {
        self.inner.lock().await.session_id.clone()
    }

    pub async fn read_statistics(&self) -> TransactionStats {
        self.inner.lock().await.stats
    }

    /// 最近一次层级刷新的耗时。
    pub async fn read_update_time(&self) -> Duration {
        self.inner.lock().await.update_time
    }

    pub async fn read_store_size(&self, tier: Tier) -> usize {
        self.inner.lock().await.tiers[tier.index()].store.size()
    }

    /// 读取层级中某个变量的最近值。
    pub async fn read_value(&self, tier: Tier, name: &str) -> String {
        let inner = self.inner.lock().await;
        inner.tiers[tier.index()].store.read_value(name).to_string()
    }

    pub async fn last_update(&self, tier: Tier) -> Option<TierUpdate> {
        self.inner.lock().await.tiers[tier.index()].last_update
    }

    /// 层级内容报告，同时写入日志。
    pub async fn report(&self, tier: Tier) -> String {
        let inner = self.inner.lock().await;
        let report = inner.tiers[tier.index()].store.report();
        info!(
            target: "pmac.broker",
            tier = %tier,
            variables = inner.tiers[tier.index()].store.size(),
            "tier_report\n{}",
            report
        );
        report
    }

    /// 暂停状态读取：Medium/Slow 跳过，Fast 每 4 次执行一次。
    pub async fn suppress_status_reads(&self) {
        let mut inner = self.inner.lock().await;
        inner.suppress = true;
        inner.suppress_counter = 0;
        info!(target: "pmac.broker", "status_reads_suppressed");
    }

    pub async fn reinstate_status_reads(&self) {
        let mut inner = self.inner.lock().await;
        inner.suppress = false;
        inner.suppress_counter = 0;
        info!(target: "pmac.broker", "status_reads_reinstated");
    }
}

impl BrokerInner {
    /// PreFast 与紧随其后的 Fast 同进同退，计数只在 Fast 上推进。
    fn suppressed(&mut self, tier: Tier) -> bool {
        if !self.suppress {
            return false;
        }
        match tier {
            Tier::Medium | Tier::Slow => true,
            Tier::Fast => {
                self.suppress_counter = self.suppress_counter.wrapping_add(1);
                self.suppress_counter % SUPPRESSED_FAST_DIVISOR != 0
            }
            Tier::PreFast => {
                self.suppress_counter.wrapping_add(1) % SUPPRESSED_FAST_DIVISOR != 0
            }
        }
    }

    /// 执行一次写读并记录统计，不检查连接状态。
    async fn exchange(&mut self, command: &str) -> Result<Reply, BrokerError> {
        let started = Instant::now();
        let result = self.codec.write_read(command.as_bytes()).await;
        let elapsed = started.elapsed();
        match result {
            Ok(exchange) => {
                let read = exchange.bytes_read();
                self.stats.record(exchange.bytes_written, read, elapsed, true);
                record_transaction(
                    exchange.bytes_written as u64,
                    read as u64,
                    elapsed.as_millis() as u64,
                );
                Ok(exchange.reply)
            }
            Err(err) => {
                self.stats.record(self.codec.last_bytes_written(), 0, elapsed, false);
                record_transaction_failure();
                if err.is_timeout() {
                    record_timeout();
                } else if err.is_transport() {
                    record_transport_error();
                }
                Err(err.into())
            }
        }
    }

    /// 已连接时执行事务，失败则标记断开。
    async fn transact(&mut self, command: &str) -> Result<Reply, BrokerError> {
        if !self.state.is_connected() {
            return Err(BrokerError::Disconnected);
        }
        match self.exchange(command).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.mark_disconnected(&err);
                Err(err)
            }
        }
    }

    fn mark_disconnected(&mut self, err: &BrokerError) {
        if self.state.is_connected() {
            warn!(
                target: "pmac.broker",
                session_id = %self.session_id,
                error = %err,
                "connection_lost"
            );
        }
        self.state = ConnectionState::Disconnected;
        self.new_connection = true;
    }

    /// 断开时重建传输并发送空命令探测，成功则切换为已连接。
    async fn ensure_connected(&mut self) -> bool {
        if self.state.is_connected() {
            return true;
        }
        self.state = ConnectionState::Connecting;
        if let Err(err) = self.codec.reconnect().await {
            debug!(target: "pmac.broker", error = %err, "reconnect_failed");
            self.state = ConnectionState::Disconnected;
            return false;
        }
        match self.exchange("").await {
            Ok(_) => {
                self.state = ConnectionState::Connected;
                self.new_connection = true;
                self.session_id = new_session_id();
                record_reconnect();
                info!(
                    target: "pmac.broker",
                    session_id = %self.session_id,
                    peer = %self.codec.describe(),
                    "connection_restored"
                );
                true
            }
            Err(err) => {
                debug!(target: "pmac.broker", error = %err, "reconnect_probe_failed");
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// 层级内全部分块命令都成功后才写入存储，任何一块失败时存储保持不变。
    async fn update_tier(&mut self, tier: Tier) -> Result<(), BrokerError> {
        let started = Instant::now();
        let commands = self.tiers[tier.index()].store.command_strings().to_vec();
        if commands.is_empty() {
            self.update_time = started.elapsed();
            return Ok(());
        }

        let mut replies = Vec::with_capacity(commands.len());
        for command in &commands {
            match self.transact(command).await {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    warn!(
                        target: "pmac.broker",
                        tier = %tier,
                        error = %err,
                        "tier_update_failed"
                    );
                    self.update_time = started.elapsed();
                    return Err(err);
                }
            }
        }

        let mut outcome = Ok(());
        let state = &mut self.tiers[tier.index()];
        for (command, reply) in commands.iter().zip(&replies) {
            if reply.is_device_error() {
                record_device_error();
                let code = reply.device_error_code().unwrap_or_default();
                let updated = match state.store.update_chunk(command, &reply.values_text()) {
                    Ok(updated) => updated,
                    Err(StoreError::ProtocolMismatch { updated, .. }) => updated,
                };
                warn!(
                    target: "pmac.broker",
                    tier = %tier,
                    command = %command,
                    code = %code,
                    updated,
                    "device_error_reply"
                );
                if outcome.is_ok() {
                    outcome = Err(BrokerError::Device(code));
                }
                continue;
            }
            if let Err(err) = state.store.update_chunk(command, &reply.text()) {
                record_reply_mismatch();
                warn!(
                    target: "pmac.broker",
                    tier = %tier,
                    error = %err,
                    "reply_mismatch"
                );
                if outcome.is_ok() {
                    outcome = Err(err.into());
                }
            }
        }

        state.callbacks.notify_all(&state.store, tier);
        self.sequence += 1;
        let duration = started.elapsed();
        state.last_update = Some(TierUpdate {
            sequence: self.sequence,
            completed_at: Instant::now(),
            duration,
        });
        self.update_time = duration;
        debug!(
            target: "pmac.broker",
            tier = %tier,
            commands = commands.len(),
            elapsed_ms = duration.as_millis() as u64,
            "tier_updated"
        );
        outcome
    }
}
