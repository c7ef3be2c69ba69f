//! Provider configuration
//!
//! Layered: built-in defaults, then an optional TOML file named by
//! `DAISY_CONFIG`, then environment variables. Environment names follow the
//! deployment scripts (`APP_ID`, `PROVIDER_MNEMONIC`, `POLL_SECONDS`,
//! `ALGOD_ADDR`, `ALGOD_TOKEN`) with `LEDGER_*` / `PROVIDER_CREDENTIAL`
//! preferred when both are set.

use crate::error::ConfigError;
use crate::fee::{FeeBudget, MicroAlgos};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "DAISY_CONFIG";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Contract app id. Required, non-zero.
    pub app_id: u64,
    /// Signer handle the ledger bridge resolves to the provider account.
    pub provider_credential: Option<String>,
    /// Seconds between poll cycles.
    pub poll_seconds: u64,
    pub ledger: LedgerEndpoint,
    /// Where the cursor is persisted between runs.
    pub cursor_path: PathBuf,
    pub fees: FeeSettings,
    pub retry: RetrySettings,
    pub answer: AnswerSettings,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerEndpoint {
    pub url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSettings {
    pub min_fee: u64,
    pub max_fee: u64,
    pub inner_transactions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the nominal delay drawn as random jitter (0.0 - 1.0).
    pub jitter: f64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    /// When unset the provider answers with the canned generator.
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            app_id: 0,
            provider_credential: None,
            poll_seconds: 6,
            ledger: LedgerEndpoint::default(),
            cursor_path: PathBuf::from("./data/cursor.json"),
            fees: FeeSettings::default(),
            retry: RetrySettings::default(),
            answer: AnswerSettings::default(),
        }
    }
}

impl Default for LedgerEndpoint {
    fn default() -> Self {
        Self {
            url: "http://localhost:4001".into(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl Default for FeeSettings {
    fn default() -> Self {
        let budget = FeeBudget::default();
        Self {
            min_fee: budget.min_fee.get(),
            max_fee: budget.max_fee.get(),
            inner_transactions: budget.inner_transactions,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: None,
            model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 400,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("app_id", &self.app_id)
            .field("provider_credential", &redact(&self.provider_credential))
            .field("poll_seconds", &self.poll_seconds)
            .field("ledger", &self.ledger)
            .field("cursor_path", &self.cursor_path)
            .field("fees", &self.fees)
            .field("retry", &self.retry)
            .field("answer", &self.answer)
            .finish()
    }
}

impl std::fmt::Debug for LedgerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEndpoint")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for AnswerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerSettings")
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

impl ProviderConfig {
    /// Load from the process environment (and `DAISY_CONFIG` when set), then validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an injectable variable lookup.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Overlay environment variables on top of the current values.
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some((key, v)) = first_of(lookup, &["APP_ID"]) {
            self.app_id = parse(key, &v)?;
        }
        if let Some((_, v)) = first_of(lookup, &["PROVIDER_CREDENTIAL", "PROVIDER_MNEMONIC"]) {
            self.provider_credential = Some(v);
        }
        if let Some((key, v)) = first_of(lookup, &["POLL_SECONDS"]) {
            self.poll_seconds = parse(key, &v)?;
        }
        if let Some((_, v)) = first_of(lookup, &["LEDGER_URL", "ALGOD_ADDR"]) {
            self.ledger.url = v;
        }
        if let Some((_, v)) = first_of(lookup, &["LEDGER_TOKEN", "ALGOD_TOKEN"]) {
            self.ledger.token = Some(v);
        }
        if let Some((key, v)) = first_of(lookup, &["LEDGER_TIMEOUT_SECS"]) {
            self.ledger.timeout_secs = parse(key, &v)?;
        }
        if let Some((_, v)) = first_of(lookup, &["CURSOR_PATH"]) {
            self.cursor_path = PathBuf::from(v);
        }
        if let Some((key, v)) = first_of(lookup, &["MIN_FEE_MICRO"]) {
            self.fees.min_fee = parse(key, &v)?;
        }
        if let Some((key, v)) = first_of(lookup, &["MAX_FEE_MICRO"]) {
            self.fees.max_fee = parse(key, &v)?;
        }
        if let Some((key, v)) = first_of(lookup, &["RETRY_MAX_ATTEMPTS"]) {
            self.retry.max_attempts = parse(key, &v)?;
        }
        if let Some((key, v)) = first_of(lookup, &["RETRY_BASE_MS"]) {
            self.retry.base_delay_ms = parse(key, &v)?;
        }
        if let Some((_, v)) = first_of(lookup, &["ANTHROPIC_API_KEY"]) {
            self.answer.anthropic_api_key = Some(v);
        }
        if let Some((_, v)) = first_of(lookup, &["ANTHROPIC_API_URL"]) {
            self.answer.anthropic_base_url = Some(v);
        }
        if let Some((_, v)) = first_of(lookup, &["ANSWER_MODEL"]) {
            self.answer.model = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id == 0 {
            return Err(ConfigError::Missing("APP_ID"));
        }
        if self
            .provider_credential
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
        {
            return Err(ConfigError::Missing("PROVIDER_CREDENTIAL"));
        }
        if self.poll_seconds == 0 {
            return Err(ConfigError::invalid("POLL_SECONDS", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::invalid("retry.jitter", "must be within 0.0 - 1.0"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::invalid("retry.multiplier", "must be at least 1.0"));
        }
        self.fee_budget().validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }

    pub fn fee_budget(&self) -> FeeBudget {
        FeeBudget {
            min_fee: MicroAlgos(self.fees.min_fee),
            inner_transactions: self.fees.inner_transactions,
            max_fee: MicroAlgos(self.fees.max_fee),
        }
    }
}

fn first_of<'k, F>(lookup: &F, keys: &[&'k str]) -> Option<(&'k str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|&k| lookup(k).filter(|v| !v.is_empty()).map(|v| (k, v)))
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("{:?}: {}", value, e)))
}
