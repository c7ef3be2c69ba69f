//! DAISY intake - accepts prompts over HTTP and posts them as paid queries

use clap::Parser;
use daisy_core::ProviderConfig;
use daisy_intake::{start_intake, IntakeConfig, ResolvedAuth};
use daisy_ledger::HttpLedgerGateway;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "daisy-intake", about = "DAISY query intake endpoint")]
struct Cli {
    #[arg(short, long, default_value = "8787")]
    port: u16,
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,
    /// Bearer token required on POST /post-query (falls back to INTAKE_TOKEN)
    #[arg(short, long)]
    token: Option<String>,
    #[arg(long)]
    no_auth: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daisy_intake=info,daisy_ledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider = ProviderConfig::load()?;
    let signer = provider
        .provider_credential
        .clone()
        .ok_or_else(|| anyhow::anyhow!("PROVIDER_CREDENTIAL not set"))?;
    let gateway = HttpLedgerGateway::new(&provider.ledger, provider.app_id, signer)?;

    let auth = if cli.no_auth {
        ResolvedAuth::open()
    } else {
        ResolvedAuth::from_token(cli.token.or_else(|| std::env::var("INTAKE_TOKEN").ok()))
    };

    let config = IntakeConfig {
        bind: cli.bind,
        port: cli.port,
        auth,
    };
    start_intake(config, Arc::new(gateway)).await
}
