use crate::error::AppError;
use cohida_core::config::AppConfig;
use config::{Config, Environment, File};
use std::path::Path;

/// 默认配置文件名（不含扩展名），位于当前工作目录。
const DEFAULT_CONFIG_NAME: &str = "cohida";

/// # Summary
/// 加载分层配置。
///
/// # Logic
/// 1. 以 `AppConfig::default()` 为底。
/// 2. 叠加配置文件：显式路径必须存在，否则尝试可选的 `cohida.toml`。
/// 3. 叠加 `COHIDA__SECTION__KEY` 形式的环境变量。
///
/// # Arguments
/// * `path` - 命令行指定的配置文件。
///
/// # Returns
/// 合并后的配置。
pub fn load(path: Option<&Path>) -> Result<AppConfig, AppError> {
    let builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    let builder = match path {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
    };

    let config = builder
        .add_source(
            Environment::with_prefix("COHIDA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(config)
}
