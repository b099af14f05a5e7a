use clap::Parser;

use convoflow::config::ConfigManager;
use convoflow::logger::{LogConfig, init_tracing};

mod cli;

use cli::{Cli, CliContext};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config_manager = ConfigManager::env(args.env_file.clone());
    let mut log_config = LogConfig::load(&config_manager).await;
    if let Some(level) = args.log_level {
        log_config.log_level = level;
    }
    init_tracing(&log_config)?;

    let context = CliContext::new(&config_manager).await?;
    cli::execute(&context, args.command).await
}
