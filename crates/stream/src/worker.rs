use crate::manager::RealTimeDataStreamManager;
use decidra_core::common::StreamKind;
use decidra_core::market::error::MarketError;
use decidra_core::stream::entity::StreamStatus;
use std::sync::Weak;
use tokio::time::Instant;
use tracing::{debug, trace};

/// # Summary
/// 单个数据流的轮询循环。
///
/// # Logic
/// 1. 每轮升级 `Weak` 引用，管理器已释放、已停止或状态为 Stopped/Error 时退出。
/// 2. Paused 时按该类型的检查间隔休眠，不抓取。
/// 3. 在超时约束下抓取：成功则写缓存、记统计、发事件后按正常间隔休眠；
///    无数据按正常间隔休眠；失败或超时计入错误并按两倍间隔休眠。
/// 4. 休眠前释放强引用。
///
/// # Arguments
/// * `manager`: 管理器弱引用。
/// * `kind`: 数据流类型。
/// * `code`: 证券代码。
pub(crate) async fn run_stream(
    manager: Weak<RealTimeDataStreamManager>,
    kind: StreamKind,
    code: String,
) {
    debug!("{} stream loop for {} started", kind, code);
    loop {
        let Some(this) = manager.upgrade() else {
            break;
        };
        let Some((status, config)) = this.poll_state(kind) else {
            break;
        };

        let delay = match status {
            StreamStatus::Stopped | StreamStatus::Error => break,
            StreamStatus::Paused => {
                trace!("{} stream paused", kind);
                kind.paused_poll()
            }
            StreamStatus::Starting | StreamStatus::Running => {
                let started = Instant::now();
                let fetched =
                    tokio::time::timeout(config.timeout_duration(), this.provider().fetch(kind, &code))
                        .await;
                match fetched {
                    Ok(Ok(Some(payload))) => {
                        this.record_payload(kind, &code, payload, started.elapsed())
                            .await;
                        config.interval_duration()
                    }
                    Ok(Ok(None)) => {
                        trace!("{} stream for {}: no new data", kind, code);
                        config.interval_duration()
                    }
                    Ok(Err(e)) => {
                        this.record_failure(&config, &code, &e);
                        config.error_backoff()
                    }
                    Err(_) => {
                        this.record_failure(&config, &code, &MarketError::Timeout(config.timeout));
                        config.error_backoff()
                    }
                }
            }
        };

        drop(this);
        tokio::time::sleep(delay).await;
    }
    debug!("{} stream loop for {} exited", kind, code);
}
