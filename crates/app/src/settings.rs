use config::{Config, ConfigError, Environment, File};
use decidra_core::config::AppConfig;
use std::path::Path;

/// 默认的配置文件名，不存在时忽略。
pub const DEFAULT_CONFIG_FILE: &str = "decidra.toml";

/// # Summary
/// 加载应用配置。
///
/// # Logic
/// 1. 以 `AppConfig::default()` 为底。
/// 2. 叠加可选的 TOML 配置文件。
/// 3. 叠加 `DECIDRA__SECTION__KEY` 形式的环境变量。
/// 4. 命令行传入的证券代码覆盖 `monitor.stock_code`。
/// 5. 修正为 0 的缓存容量与清理间隔。
///
/// # Arguments
/// * `path`: 配置文件路径。
/// * `stock_code`: 命令行指定的证券代码。
///
/// # Returns
/// 合并后的配置；格式错误时返回 `ConfigError`。
pub fn load_config(path: &Path, stock_code: Option<String>) -> Result<AppConfig, ConfigError> {
    Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("DECIDRA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("monitor.stock_code", stock_code)?
        .build()?
        .try_deserialize::<AppConfig>()
        .map(AppConfig::normalized)
}
