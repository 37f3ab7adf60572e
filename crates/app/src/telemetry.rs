use decidra_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// # Summary
/// 初始化全局日志。
///
/// # Logic
/// 1. 过滤级别优先取 `RUST_LOG`，否则使用配置中的 `level`。
/// 2. 始终输出到终端。
/// 3. 配置了 `dir` 时追加按天滚动的文件输出（非阻塞写入，无 ANSI 颜色）。
///
/// # Returns
/// 文件输出的 guard，必须存活到进程退出以保证日志落盘。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "decidra.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
