use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Upload rejected: {message}")]
    UploadError { message: String },

    #[error("LLM API returned status {status}: {body}")]
    LlmStatusError { status: u16, body: String },

    #[error("Request timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },

    #[error("Unexpected LLM response: {message}")]
    LlmResponseError { message: String },

    #[error("Business logic extraction failed: {message}")]
    ExtractionError { message: String },

    #[error("Document generation failed: {message}")]
    DocumentError { message: String },

    #[error("Workflow error: {message}")]
    WorkflowError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Input,
    Processing,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnalyzerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalyzerError::ConfigError { .. }
            | AnalyzerError::MissingConfigError { .. }
            | AnalyzerError::InvalidConfigValueError { .. }
            | AnalyzerError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            AnalyzerError::ApiError(_)
            | AnalyzerError::LlmStatusError { .. }
            | AnalyzerError::TimeoutError { .. } => ErrorCategory::Network,
            AnalyzerError::UploadError { .. } | AnalyzerError::WorkflowError { .. } => {
                ErrorCategory::Input
            }
            AnalyzerError::LlmResponseError { .. }
            | AnalyzerError::ExtractionError { .. }
            | AnalyzerError::SerializationError(_) => ErrorCategory::Processing,
            AnalyzerError::ZipError(_) | AnalyzerError::DocumentError { .. } => {
                ErrorCategory::Output
            }
            AnalyzerError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 網路錯誤通常可以重試
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Processing | ErrorCategory::Output => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalyzerError::ApiError(_)
                | AnalyzerError::LlmStatusError { .. }
                | AnalyzerError::TimeoutError { .. }
                | AnalyzerError::LlmResponseError { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            AnalyzerError::MissingConfigError { field } if field == "llm.api_key" => {
                "Set GROQ_API_KEY in the environment or api_key in the [llm] config section"
                    .to_string()
            }
            AnalyzerError::TimeoutError { .. } => {
                "Increase --timeout or reduce --sample-size so the model has less to read"
                    .to_string()
            }
            AnalyzerError::LlmStatusError { status, .. } if *status == 401 || *status == 403 => {
                "Check that the API key is valid for the configured endpoint".to_string()
            }
            AnalyzerError::LlmStatusError { status, .. } if *status == 429 => {
                "The API is rate limiting requests; wait a moment or try a different model"
                    .to_string()
            }
            AnalyzerError::UploadError { .. } => {
                "Make sure the file is a COBOL/IDMS source between 100 bytes and 10MB".to_string()
            }
            AnalyzerError::ExtractionError { .. } | AnalyzerError::LlmResponseError { .. } => {
                "Try a different model, or rerun with --force to continue with a placeholder"
                    .to_string()
            }
            AnalyzerError::WorkflowError { .. } => {
                "Run the earlier workflow steps first, or use the `run` command".to_string()
            }
            _ => match self.category() {
                ErrorCategory::Configuration => {
                    "Review the configuration file and command line flags".to_string()
                }
                ErrorCategory::Network => {
                    "Check network connectivity and the LLM endpoint, then retry".to_string()
                }
                ErrorCategory::Output | ErrorCategory::System => {
                    "Check that the output directory exists and is writable".to_string()
                }
                _ => "Check the logs with --verbose for details".to_string(),
            },
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Could not reach the LLM service: {}", self),
            ErrorCategory::Input => format!("Input problem: {}", self),
            ErrorCategory::Processing => format!("Processing failed: {}", self),
            ErrorCategory::Output => format!("Could not write output: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
