//! AI provider adapters.

mod deepseek;
mod mock;

pub use deepseek::{DeepSeekConfig, DeepSeekProvider};
pub use mock::MockAiProvider;
