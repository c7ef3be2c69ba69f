//! Canned answers with simulated work, for local networks and demos.

use crate::generator::{AnswerGenerator, GeneratorResult};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

const TEMPLATES: &[&str] = &[
    "Answer to '{q}': verify with sources and keep it concise.",
    "My take on '{q}': decompose into steps and validate each.",
    "For '{q}', rely on minimal, sufficient facts and cite where possible.",
];

pub struct CannedGenerator {
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(800),
        }
    }
}

impl CannedGenerator {
    /// No simulated delay.
    pub fn instant() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn pick_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..self.max_delay)
    }
}

#[async_trait::async_trait]
impl AnswerGenerator for CannedGenerator {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, query_text: &str) -> GeneratorResult<String> {
        let delay = self.pick_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let template = TEMPLATES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(TEMPLATES[0]);
        Ok(template.replace("{q}", query_text.trim()))
    }
}
