//! Integration tests: daemon wiring end to end against the in-memory ledger.
//!
//! A query is posted the way the intake posts it, the daemon-built
//! reconciler answers it, and a restarted daemon resumes from the cursor
//! file instead of re-paying for work.

use daisy::daemon::{build_reconciler, select_generator};
use daisy_core::{AnswerSettings, AssetId, PostQuery, ProviderConfig, QueryId};
use daisy_ledger::{LedgerGateway, MemoryLedger};
use daisy_provider::CycleEnd;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TOKEN: AssetId = AssetId(1001);

fn config(dir: &std::path::Path) -> ProviderConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("APP_ID", "77".to_string()),
        ("PROVIDER_MNEMONIC", "provider-signer".to_string()),
        ("POLL_SECONDS", "1".to_string()),
        ("RETRY_BASE_MS", "1".to_string()),
        ("CURSOR_PATH", dir.join("cursor.json").display().to_string()),
    ]);
    ProviderConfig::load_with(|k| env.get(k).cloned()).unwrap()
}

async fn post(ledger: &Arc<MemoryLedger>, text: &str) {
    let user = ledger.connect("USER");
    let cfg = user.read_config().await.unwrap();
    user.post_query(PostQuery::for_contract(&cfg, "USER", text).unwrap())
        .await
        .unwrap();
}

#[test]
fn canned_generator_without_api_key() {
    let generator = select_generator(&AnswerSettings::default());
    assert_eq!(generator.name(), "canned");

    let settings = AnswerSettings {
        anthropic_api_key: Some("sk-test".into()),
        ..AnswerSettings::default()
    };
    assert_eq!(select_generator(&settings).name(), "anthropic");
}

#[tokio::test]
async fn daemon_answers_and_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let ledger = MemoryLedger::new("GOVERNOR", TOKEN, 25);
    ledger.fund("USER", TOKEN, 100);
    post(&ledger, "first").await;
    post(&ledger, "second").await;

    let generator = Arc::new(daisy_answer::CannedGenerator::instant());
    let mut first = build_reconciler(&config, Arc::new(ledger.connect("PROVIDER")), generator.clone())
        .await
        .unwrap();
    let report = first.run_cycle().await;
    assert_eq!(report.answered(), 2);
    assert_eq!(report.end, CycleEnd::CaughtUp);
    assert_eq!(ledger.balance("PROVIDER", TOKEN), 50);

    let answer = ledger.query(QueryId(1)).unwrap().response_text;
    assert!(answer.contains("first"), "{}", answer);

    post(&ledger, "third").await;
    let mut restarted = build_reconciler(&config, Arc::new(ledger.connect("PROVIDER")), generator)
        .await
        .unwrap();
    assert_eq!(restarted.cursor(), QueryId(2));
    let report = restarted.run_cycle().await;
    assert_eq!(report.items.len(), 1);
    assert_eq!(restarted.cursor(), QueryId(3));
    assert_eq!(ledger.submit_attempts(QueryId(1)), 1);
    assert_eq!(ledger.submit_attempts(QueryId(2)), 1);
}

#[tokio::test]
async fn daemon_loop_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let ledger = MemoryLedger::new("GOVERNOR", TOKEN, 25);
    ledger.fund("USER", TOKEN, 100);
    post(&ledger, "only").await;

    let mut reconciler = build_reconciler(
        &config,
        Arc::new(ledger.connect("PROVIDER")),
        Arc::new(daisy_answer::CannedGenerator::instant()),
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let handle = tokio::spawn(async move { reconciler.run(cancel).await });

    for _ in 0..200 {
        if ledger.query(QueryId(1)).map(|q| q.is_answered).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    stopper.cancel();

    // the 1 s poll sleep is interrupted, not waited out
    let cursor = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("loop ignored cancellation")
        .unwrap();
    assert_eq!(cursor, QueryId(1));
}

#[tokio::test]
async fn low_fee_ceiling_fails_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.fees.max_fee = 1_500;
    let ledger = MemoryLedger::new("GOVERNOR", TOKEN, 25);

    let result = build_reconciler(
        &config,
        Arc::new(ledger.connect("PROVIDER")),
        Arc::new(daisy_answer::CannedGenerator::instant()),
    )
    .await;
    let err = result.err().expect("fee ceiling below budget must be rejected");
    assert!(err.to_string().contains("fee ceiling"), "{}", err);
}
