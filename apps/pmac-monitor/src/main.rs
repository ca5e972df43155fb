//! PMAC 变量监视：按层级轮询配置的变量，变化写入日志，并周期性输出事务统计。

mod consumer;

use consumer::LoggingConsumer;
use domain::Tier;
use pmac_broker::{MessageBroker, PollScheduler, SchedulerConfig};
use pmac_config::AppConfig;
use pmac_protocol::{CodecConfig, TcpTransport, TcpTransportConfig};
use pmac_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let transport_config = TcpTransportConfig {
        host: config.pmac_host.clone(),
        port: config.pmac_port,
        connect_timeout_ms: config.connect_timeout_ms,
    };
    let codec_config = CodecConfig {
        timeout_ms: config.timeout_ms,
        max_reply_bytes: config.max_reply_bytes,
        flush_before_write: config.flush_before_write,
    };

    // 控制器暂时不可达时照常启动，由调度器重连
    let builder = match TcpTransport::connect(transport_config.clone()).await {
        Ok(transport) => MessageBroker::builder(Box::new(transport), codec_config),
        Err(err) => {
            warn!(target: "pmac.monitor", error = %err, "initial_connect_failed");
            MessageBroker::builder(
                Box::new(TcpTransport::detached(transport_config)),
                codec_config,
            )
            .start_disconnected()
        }
    };
    let broker = Arc::new(builder.build());

    for tier in Tier::ALL {
        let variables = config.monitor_variables(tier);
        if variables.is_empty() {
            continue;
        }
        let count = broker
            .add_monitor_variables(tier, &variables.join(" "))
            .await;
        broker
            .register_for_updates(Arc::new(LoggingConsumer::new(variables.to_vec())), tier)
            .await;
        info!(target: "pmac.monitor", tier = %tier, variables = count, "tier_configured");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = PollScheduler::new(
        broker.clone(),
        SchedulerConfig {
            fast_period_ms: config.fast_period_ms,
            medium_period_ms: config.medium_period_ms,
            slow_period_ms: config.slow_period_ms,
        },
    )
    .spawn(shutdown_rx.clone());
    let reporter = spawn_stats_reporter(broker.clone(), config.stats_interval_seconds, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!(target: "pmac.monitor", "shutdown_requested");
    let _ = shutdown_tx.send(true);
    scheduler.await?;
    reporter.await?;
    Ok(())
}

/// 周期性输出事务统计；间隔为 0 时不启动。
fn spawn_stats_reporter(
    broker: Arc<MessageBroker>,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if interval_seconds == 0 {
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            let stats = broker.read_statistics().await;
            let state = broker.connection_state().await;
            let update_time = broker.read_update_time().await;
            let totals = metrics().snapshot();
            info!(
                target: "pmac.monitor",
                state = ?state,
                messages = stats.messages,
                failures = stats.failures,
                bytes_written = stats.bytes_written,
                bytes_read = stats.bytes_read,
                last_elapsed_ms = stats.last_elapsed.as_millis() as u64,
                average_elapsed_ms = stats.average_elapsed().as_millis() as u64,
                update_time_ms = update_time.as_millis() as u64,
                reconnects = totals.reconnects,
                reply_mismatches = totals.reply_mismatches,
                "transaction_statistics"
            );
        }
    })
}
