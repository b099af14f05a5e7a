use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod schema;
pub mod simulate;
pub mod validate;

use schema::SchemaArgs;
use simulate::SimulateArgs;
use validate::ValidateArgs;

use convoflow::config::{ConfigManager, EngineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "convoflow",
    about = "Run conversational flows: trigger, branch, ask and resume",
    version
)]
pub struct Cli {
    /// Optional .env file to load before reading configuration
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with flows on stdin/stdout
    Simulate(SimulateArgs),

    /// Check a flow file for structural problems
    Validate(ValidateArgs),

    /// Emit JSON-Schema for flow files
    Schema(SchemaArgs),
}

#[derive(Clone, Debug)]
pub struct CliContext {
    pub engine_config: EngineConfig,
}

impl CliContext {
    pub async fn new(config_manager: &ConfigManager) -> anyhow::Result<Self> {
        let engine_config = EngineConfig::load(config_manager).await?;
        Ok(Self { engine_config })
    }
}

pub async fn execute(context: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Simulate(args) => simulate::execute(args, context).await,
        Commands::Validate(args) => validate::execute(args, context).await,
        Commands::Schema(args) => schema::execute(args, context).await,
    }
}
