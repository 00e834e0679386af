use anyhow::{Context, Result};
use clap::Parser;
use keeper_common::{
    chain::ChainRegistry,
    config::KeeperConfig,
    proof::{TlsCertificateSource, TlsProofConfig},
    types::IpfsData,
};
use keeper_validator::TaskValidator;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "validator", about = "Validate a keeper's published task bundle")]
struct Args {
    /// Keeper configuration file
    #[arg(long, env = "KEEPER_CONFIG")]
    config: PathBuf,

    /// Published bundle (JSON)
    #[arg(long)]
    bundle: PathBuf,

    /// Skip re-fetching the proof certificate
    #[arg(long)]
    skip_certificate_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting Keeper Validator");

    let config = KeeperConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let content = std::fs::read_to_string(&args.bundle)
        .with_context(|| format!("reading bundle {}", args.bundle.display()))?;
    let bundle: IpfsData = serde_json::from_str(&content).context("parsing bundle")?;

    let mut validator = TaskValidator::new(Arc::new(ChainRegistry::new(&config)));
    if !args.skip_certificate_check {
        let tls = TlsProofConfig::new(config.tls_proof_host.clone()).with_port(config.tls_proof_port);
        validator = validator.with_certificate_source(Arc::new(TlsCertificateSource::new(tls)));
    }

    let verdict = match validator.validate_task(&bundle).await {
        Ok(valid) => json!({ "valid": valid }),
        Err(e) => {
            error!("Validation failed: {}", e);
            json!({ "valid": false, "reason": e.to_string() })
        }
    };

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
