use crate::adapters::llm::{API_KEY_ENV, DEFAULT_BASE_URL};
use crate::core::chunker::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_SAMPLE_SIZE};
use crate::core::ConfigProvider;
use crate::domain::model::RequestSettings;
use crate::utils::error::{AnalyzerError, Result};
use crate::utils::validation::{self, Validate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MODEL: &str = "llama3-8b-8192";
pub const SUPPORTED_MODELS: [&str; 3] = ["llama3-8b-8192", "llama3-70b-8192", "mixtral-8x7b-32768"];

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let settings = RequestSettings::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: settings.model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_seconds: settings.timeout_seconds,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 只處理前 N 個字元；None 代表整個檔案
    pub sample_size: Option<usize>,
    pub max_chunk_size: usize,
    pub output_path: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sample_size: Some(DEFAULT_SAMPLE_SIZE),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            output_path: "./output".to_string(),
        }
    }
}

/// Command line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub sample_size: Option<usize>,
    pub full_file: bool,
    pub max_chunk_size: Option<usize>,
    pub output_path: Option<String>,
}

impl AnalyzerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| AnalyzerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(base_url) = &overrides.base_url {
            self.llm.base_url = base_url.clone();
        }
        if let Some(model) = &overrides.model {
            self.llm.model = model.clone();
        }
        if let Some(temperature) = overrides.temperature {
            self.llm.temperature = temperature;
        }
        if let Some(max_tokens) = overrides.max_tokens {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.llm.timeout_seconds = timeout;
        }
        if let Some(sample_size) = overrides.sample_size {
            self.processing.sample_size = Some(sample_size);
        }
        if overrides.full_file {
            self.processing.sample_size = None;
        }
        if let Some(max_chunk_size) = overrides.max_chunk_size {
            self.processing.max_chunk_size = max_chunk_size;
        }
        if let Some(output_path) = &overrides.output_path {
            self.processing.output_path = output_path.clone();
        }
    }

    /// The configured key, falling back to the GROQ_API_KEY environment variable.
    pub fn api_key(&self) -> Result<String> {
        self.llm
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty() && !ENV_VAR.is_match(key))
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AnalyzerError::MissingConfigError {
                field: "llm.api_key".to_string(),
            })
    }

    pub fn output_path(&self) -> &str {
        &self.processing.output_path
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("llm.base_url", &self.llm.base_url)?;
        validation::validate_non_empty_string("llm.model", &self.llm.model)?;
        validation::validate_range("llm.temperature", self.llm.temperature, 0.0, 1.0)?;
        validation::validate_range("llm.max_tokens", self.llm.max_tokens, 1000, 32000)?;
        validation::validate_range("llm.timeout_seconds", self.llm.timeout_seconds, 30, 300)?;
        validation::validate_positive_number(
            "llm.retry_attempts",
            self.llm.retry_attempts as usize,
            1,
        )?;

        if let Some(sample_size) = self.processing.sample_size {
            validation::validate_positive_number("processing.sample_size", sample_size, 1000)?;
        }
        validation::validate_positive_number(
            "processing.max_chunk_size",
            self.processing.max_chunk_size,
            1000,
        )?;
        validation::validate_path("processing.output_path", &self.processing.output_path)?;

        if !SUPPORTED_MODELS.contains(&self.llm.model.as_str()) {
            tracing::warn!(
                "⚠️ Model {} is not one of the tested models ({})",
                self.llm.model,
                SUPPORTED_MODELS.join(", ")
            );
        }

        Ok(())
    }
}

/// 替換環境變數 (例如 ${GROQ_API_KEY})，未設定的保持原樣
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
}

impl ConfigProvider for AnalyzerConfig {
    fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            timeout_seconds: self.llm.timeout_seconds,
        }
    }

    fn sample_size(&self) -> Option<usize> {
        self.processing.sample_size
    }

    fn max_chunk_size(&self) -> usize {
        self.processing.max_chunk_size
    }

    fn retry_attempts(&self) -> u32 {
        self.llm.retry_attempts
    }

    fn retry_delay_ms(&self) -> u64 {
        self.llm.retry_delay_ms
    }
}

impl Validate for AnalyzerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[llm]
base_url = "http://localhost:8080/v1"
api_key = "secret"
model = "llama3-70b-8192"
temperature = 0.2
max_tokens = 8000
timeout_seconds = 60

[processing]
sample_size = 2000
max_chunk_size = 4000
output_path = "./reports"
"#;

        let config = AnalyzerConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.api_key().unwrap(), "secret");
        assert_eq!(config.request_settings().model, "llama3-70b-8192");
        assert_eq!(config.sample_size(), Some(2000));
        assert_eq!(config.max_chunk_size(), 4000);
        assert_eq!(config.retry_attempts(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AnalyzerConfig::from_toml_str("").unwrap();

        assert_eq!(config, AnalyzerConfig::default());
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.sample_size(), Some(DEFAULT_SAMPLE_SIZE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("IDMS_TEST_BASE_URL", "https://llm.internal.test/v1");

        let config =
            AnalyzerConfig::from_toml_str("[llm]\nbase_url = \"${IDMS_TEST_BASE_URL}\"\n").unwrap();
        assert_eq!(config.llm.base_url, "https://llm.internal.test/v1");

        std::env::remove_var("IDMS_TEST_BASE_URL");
    }

    #[test]
    fn test_unresolved_api_key_placeholder_is_ignored() {
        let config =
            AnalyzerConfig::from_toml_str("[llm]\napi_key = \"${IDMS_TEST_UNSET_KEY}\"\n").unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("${IDMS_TEST_UNSET_KEY}"));
        // 佔位字串不可當作金鑰使用
        if std::env::var(API_KEY_ENV).is_err() {
            assert!(matches!(
                config.api_key(),
                Err(AnalyzerError::MissingConfigError { .. })
            ));
        }
    }

    #[test]
    fn test_validation_ranges() {
        let mut config = AnalyzerConfig::default();
        config.llm.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.llm.max_tokens = 500;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.llm.timeout_seconds = 10;
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.processing.sample_size = Some(100);
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.llm.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_model_is_accepted() {
        let mut config = AnalyzerConfig::default();
        config.llm.model = "gemma-7b-it".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = AnalyzerConfig::default();
        config.apply_overrides(&ConfigOverrides {
            model: Some("mixtral-8x7b-32768".to_string()),
            temperature: Some(0.5),
            full_file: true,
            output_path: Some("/tmp/idms".to_string()),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.llm.model, "mixtral-8x7b-32768");
        assert_eq!(config.llm.temperature, 0.5);
        assert_eq!(config.sample_size(), None);
        assert_eq!(config.output_path(), "/tmp/idms");
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[processing]\nmax_chunk_size = 6000\n")
            .unwrap();

        let config = AnalyzerConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.max_chunk_size(), 6000);
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
    }
}
