use anyhow::{Context, Result};
use clap::Parser;
use ethers::signers::{LocalWallet, Signer};
use keeper_common::{
    chain::ChainRegistry,
    config::KeeperConfig,
    proof::{TlsCertificateSource, TlsProofConfig},
    types::KeeperTask,
};
use keeper_executor::{TaskExecutor, WasmScriptRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "executor", about = "Execute a dispatched keeper task")]
struct Args {
    /// Keeper configuration file
    #[arg(long, env = "KEEPER_CONFIG")]
    config: PathBuf,

    /// Performer signing key (hex)
    #[arg(long, env = "KEEPER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Dispatched task (JSON)
    #[arg(long)]
    task: PathBuf,

    /// Fail on missing struct fields instead of zero-filling them
    #[arg(long)]
    strict_arguments: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting Keeper Executor");

    let config = KeeperConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let wallet: LocalWallet = args
        .private_key
        .trim_start_matches("0x")
        .parse()
        .context("parsing private key")?;
    info!(address = ?wallet.address(), "Loaded performer key");

    let content = std::fs::read_to_string(&args.task)
        .with_context(|| format!("reading task {}", args.task.display()))?;
    let task: KeeperTask = serde_json::from_str(&content).context("parsing task")?;

    let tls = TlsProofConfig::new(config.tls_proof_host.clone()).with_port(config.tls_proof_port);
    let mut executor = TaskExecutor::new(
        Arc::new(ChainRegistry::new(&config)),
        Arc::new(WasmScriptRunner::new()?),
        Arc::new(TlsCertificateSource::new(tls)),
        wallet,
        config.nonce.clone(),
    );
    if args.strict_arguments {
        executor = executor.with_strict_arguments();
    }

    let outcomes = Arc::new(executor).execute_task(task).await?;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}
