//! DAISY answer generation - pluggable generators behind one trait

pub mod anthropic;
pub mod canned;
pub mod generator;

pub use anthropic::AnthropicGenerator;
pub use canned::CannedGenerator;
pub use generator::{AnswerGenerator, GeneratorError, GeneratorResult};
