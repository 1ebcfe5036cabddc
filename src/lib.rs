pub mod adapters;
#[cfg(feature = "cli")]
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, toml_config::AnalyzerConfig, Cli};

pub use adapters::llm::{GroqClient, RetryPolicy};
pub use core::engine::{AnalyzerEngine, ExportReport};
pub use core::workflow::{WorkflowSession, WorkflowStep};
pub use domain::model::{BusinessLogic, ProgramFile, TestScript};
pub use utils::error::{AnalyzerError, Result};
