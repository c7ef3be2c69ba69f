//! Tracing setup for the daemon

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str =
    "daisy=info,daisy_provider=info,daisy_ledger=info,daisy_answer=info";

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the filter, `LOG_FORMAT=json` switches stdout to JSON
/// lines, and `LOG_DIR` adds a daily rolling file. Keep the returned guard
/// alive for as long as the file should be flushed.
pub fn init_tracing() -> Option<WorkerGuard> {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let (file_writer, guard) = match std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "daisy-provider.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with((!json).then(|| fmt::layer()))
        .with(json.then(|| fmt::layer().json()))
        .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
        .init();

    guard
}
