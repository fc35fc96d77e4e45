mod cli;
mod commands;
mod error;
mod logging;
mod settings;

use clap::Parser;
use cli::Cli;
use commands::App;
use error::AppError;
use std::process::ExitCode;
use tracing::{debug, error, info};

/// # Summary
/// 命令行入口，纯粹的装配层。
///
/// # Logic
/// 1. 解析参数并加载 `.env`。
/// 2. 加载分层配置并初始化日志。
/// 3. 交给 `App` 执行子命令，错误统一转为非零退出码。
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    match run(cli, dotenv.is_ok()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, dotenv_loaded: bool) -> Result<(), AppError> {
    let config = settings::load(cli.config.as_deref())?;
    let _guard = logging::init(&config.log, cli.verbose)?;
    debug!(".env loaded: {}", dotenv_loaded);
    info!("cohida {} starting", env!("CARGO_PKG_VERSION"));

    App::new(config, cli.output_dir).run(cli.command).await
}
