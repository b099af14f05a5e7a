use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use super::CliContext;
use convoflow::ai::{OllamaAi, UnifiedAi};
use convoflow::config::EngineConfig;
use convoflow::context::{ExecutionContext, Replier, ReplyReceipt, Sender, TenantInfo};
use convoflow::engine::{ExecutionOutcome, FlowEngine};
use convoflow::error::ReplyError;
use convoflow::flow::FlowManager;
use convoflow::session::{InMemorySuspensionStore, SuspensionStoreRef};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// A flow file or a directory of flow files
    #[arg(long)]
    pub flow: PathBuf,

    /// Tenant to run as. Defaults to the tenant of the first loaded flow
    #[arg(long)]
    pub tenant: Option<String>,

    /// Sender id used for suspension keys
    #[arg(long, default_value = "simulator")]
    pub user: String,

    /// Plan tier checked by `is_premium`
    #[arg(long)]
    pub plan_tier: Option<String>,

    /// Sender tags checked by `has_tag`, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Answer ai and ai_router nodes with Ollama (OLLAMA_URL / OLLAMA_MODEL)
    #[arg(long)]
    pub ollama: bool,
}

/// Prints bot replies on stdout.
#[derive(Debug)]
struct StdoutReplier;

#[async_trait]
impl Replier for StdoutReplier {
    async fn reply(&self, text: &str) -> Result<ReplyReceipt, ReplyError> {
        println!("bot> {}", text);
        Ok(ReplyReceipt::default())
    }
}

fn build_store(config: &EngineConfig) -> anyhow::Result<SuspensionStoreRef> {
    let store: SuspensionStoreRef = match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            info!("Using redis suspension store");
            Arc::new(convoflow::session::RedisSuspensionStore::new(url)?)
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("REDIS_URL is set but convoflow was built without the `redis` feature");
            InMemorySuspensionStore::new()
        }
        None => InMemorySuspensionStore::new(),
    };
    Ok(store)
}

pub async fn execute(args: SimulateArgs, context: &CliContext) -> anyhow::Result<()> {
    let store = build_store(&context.engine_config)?;
    let engine = Arc::new(FlowEngine::new(store, context.engine_config.clone()));
    let manager = FlowManager::new(engine);

    if args.flow.is_dir() {
        manager.load_all_flows_from_dir(&args.flow).await?;
    } else {
        let flow = FlowManager::load_flow_from_file(&args.flow)
            .with_context(|| format!("could not load {}", args.flow.display()))?;
        manager.register_flow(flow);
    }
    if manager.is_empty() {
        bail!("no flows found at {}", args.flow.display());
    }

    let tenant_id = match args.tenant {
        Some(tenant) => tenant,
        None => manager.tenants().into_iter().next().unwrap_or_default(),
    };
    let flows = manager.flows_for_tenant(&tenant_id);
    if flows.is_empty() {
        bail!("no active flows for tenant `{}`", tenant_id);
    }
    println!(
        "Loaded {} active flow(s) for tenant `{}`. Type a message, Ctrl-D to quit.",
        flows.len(),
        tenant_id
    );

    let unified_ai = if args.ollama {
        let ollama = OllamaAi::new(
            context.engine_config.ollama_url.clone(),
            context.engine_config.ollama_model.clone(),
        );
        info!("Using Ollama model {}", ollama.model());
        Some(UnifiedAi::single(Arc::new(ollama)))
    } else {
        None
    };

    let sender = Sender {
        jid: args.user,
        tags: args.tags,
    };
    let tenant = args.plan_tier.map(TenantInfo::with_plan);
    let replier: Arc<dyn Replier> = Arc::new(StdoutReplier);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let ctx = ExecutionContext {
            body: line,
            sender: sender.clone(),
            tenant_id: tenant_id.clone(),
            tenant: tenant.clone(),
            replier: replier.clone(),
            unified_ai: unified_ai.clone(),
        };
        match manager.process_message(&ctx).await {
            None => println!("(no flow engaged)"),
            Some(report) => match report.outcome {
                ExecutionOutcome::Suspended { node_id } => {
                    println!("({} waiting for input at `{}`)", report.flow_id, node_id)
                }
                ExecutionOutcome::Failed { reason } => println!("({} failed: {})", report.flow_id, reason),
                _ => {}
            },
        }
    }
    Ok(())
}
