//! Remote model providers.

mod types;

#[cfg(feature = "openai")]
pub mod openai;
pub mod stub;

pub use types::{ChatChunk, ChatRequest, Provider};
