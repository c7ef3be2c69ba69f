//! Provider daemon wiring

use anyhow::Context;
use daisy_answer::{AnswerGenerator, AnthropicGenerator, CannedGenerator};
use daisy_core::{AnswerSettings, ProviderConfig, QueryId};
use daisy_ledger::{HttpLedgerGateway, LedgerGateway};
use daisy_provider::{FileCursorStore, Reconciler, ReconcilerSettings};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The Anthropic generator when a key is configured, canned answers otherwise.
pub fn select_generator(settings: &AnswerSettings) -> Arc<dyn AnswerGenerator> {
    match settings.anthropic_api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            let mut generator = AnthropicGenerator::new(key, &settings.model)
                .with_max_tokens(settings.max_tokens);
            if let Some(url) = &settings.anthropic_base_url {
                generator = generator.with_base_url(format!("{}/v1/messages", url.trim_end_matches('/')));
            }
            info!(model = %settings.model, "answering with Anthropic");
            Arc::new(generator)
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set, answering with canned responses");
            Arc::new(CannedGenerator::default())
        }
    }
}

/// Build a reconciler over `gateway` with the file cursor from `config`,
/// restored to the last persisted position.
pub async fn build_reconciler(
    config: &ProviderConfig,
    gateway: Arc<dyn LedgerGateway>,
    generator: Arc<dyn AnswerGenerator>,
) -> anyhow::Result<Reconciler> {
    let store = Arc::new(FileCursorStore::new(&config.cursor_path));
    let reconciler = Reconciler::new(ReconcilerSettings::from_config(config), gateway, generator, store)?
        .restore()
        .await
        .with_context(|| format!("loading cursor from {}", config.cursor_path.display()))?;
    Ok(reconciler)
}

/// Run the provider against the configured ledger bridge until `cancel` fires.
pub async fn run(config: ProviderConfig, cancel: CancellationToken) -> anyhow::Result<QueryId> {
    let signer = config
        .provider_credential
        .clone()
        .context("provider credential missing")?;
    let gateway = HttpLedgerGateway::new(&config.ledger, config.app_id, signer)?;
    let generator = select_generator(&config.answer);

    info!(
        app_id = config.app_id,
        ledger = %config.ledger.url,
        cursor_path = %config.cursor_path.display(),
        max_fee = config.fees.max_fee,
        "starting DAISY provider v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut reconciler = build_reconciler(&config, Arc::new(gateway), generator).await?;
    Ok(reconciler.run(cancel).await)
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
pub fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
