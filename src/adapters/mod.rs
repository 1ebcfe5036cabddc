// Adapters layer: concrete implementations for external systems.

pub mod llm;

pub use llm::{complete_with_retry, GroqClient, RetryPolicy};
