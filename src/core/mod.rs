pub mod chunker;
pub mod document;
pub mod engine;
pub mod extraction;
pub mod extractor;
pub mod merge;
pub mod prompts;
pub mod test_generator;
pub mod test_parser;
pub mod upload;
pub mod validator;
pub mod workflow;

pub use crate::domain::ports::{ConfigProvider, LlmClient, Storage};
pub use crate::utils::error::Result;
