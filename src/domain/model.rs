use crate::utils::error::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IDMS-DC 為線上程式，IDMS-DB 為批次程式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramType {
    #[serde(rename = "DC", alias = "Online")]
    Dc,
    #[serde(rename = "DB", alias = "Batch")]
    Db,
}

impl ProgramType {
    pub fn is_online(&self) -> bool {
        matches!(self, ProgramType::Dc)
    }

    /// 完整名稱，例如 "IDMS-DC"
    pub fn label(&self) -> &'static str {
        match self {
            ProgramType::Dc => "IDMS-DC",
            ProgramType::Db => "IDMS-DB",
        }
    }
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramType::Dc => write!(f, "DC"),
            ProgramType::Db => write!(f, "DB"),
        }
    }
}

impl FromStr for ProgramType {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DC" | "ONLINE" | "IDMS-DC" => Ok(ProgramType::Dc),
            "DB" | "BATCH" | "IDMS-DB" => Ok(ProgramType::Db),
            _ => Err(AnalyzerError::InvalidConfigValueError {
                field: "program_type".to_string(),
                value: s.to_string(),
                reason: "Program type must be one of DC, DB, Online, Batch".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Direction::Input => "Input",
            Direction::Output => "Output",
            Direction::Both => "Both",
        };
        write!(f, "{}", text)
    }
}

impl FromStr for Direction {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Input" => Ok(Direction::Input),
            "Output" => Ok(Direction::Output),
            "Both" => Ok(Direction::Both),
            _ => Err(AnalyzerError::InvalidConfigValueError {
                field: "direction".to_string(),
                value: s.to_string(),
                reason: "Direction must be one of Input, Output, Both".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationType {
    Database,
    #[serde(rename = "API")]
    Api,
    File,
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IntegrationType::Database => "Database",
            IntegrationType::Api => "API",
            IntegrationType::File => "File",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BusinessRuleRecord")]
pub struct BusinessRule {
    pub rule_id: String,
    pub description: String,
    pub implementation: String,
}

impl BusinessRule {
    /// Builds a rule, deriving `RULE_<FIRST_THREE_WORDS>` when no id is given.
    pub fn new(
        rule_id: Option<String>,
        description: impl Into<String>,
        implementation: impl Into<String>,
    ) -> Self {
        let description = description.into();
        let rule_id = match rule_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => derive_rule_id(&description),
        };

        Self {
            rule_id,
            description,
            implementation: implementation.into(),
        }
    }
}

/// Stored form of a rule; `rule_id` may be missing or blank.
#[derive(Deserialize)]
struct BusinessRuleRecord {
    #[serde(default)]
    rule_id: Option<String>,
    description: String,
    implementation: String,
}

impl From<BusinessRuleRecord> for BusinessRule {
    fn from(record: BusinessRuleRecord) -> Self {
        BusinessRule::new(record.rule_id, record.description, record.implementation)
    }
}

fn derive_rule_id(description: &str) -> String {
    let cleaned: String = description
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().take(3).collect();

    if words.is_empty() {
        "RULE_UNKNOWN".to_string()
    } else {
        format!("RULE_{}", words.join("_").to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub field: String,
    pub rule: String,
    pub error_handling: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialCase {
    pub condition: String,
    pub handling: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPoint {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessLogic {
    pub program_name: String,
    pub program_type: ProgramType,
    pub program_purpose: String,
    #[serde(default)]
    pub core_rules: Vec<BusinessRule>,
    #[serde(default)]
    pub validations: Vec<Validation>,
    #[serde(default)]
    pub special_cases: Vec<SpecialCase>,
    #[serde(default)]
    pub integration_points: Vec<IntegrationPoint>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

impl BusinessLogic {
    pub fn new(
        program_name: impl Into<String>,
        program_type: ProgramType,
        program_purpose: impl Into<String>,
    ) -> Self {
        Self {
            program_name: program_name.into(),
            program_type,
            program_purpose: program_purpose.into(),
            core_rules: Vec::new(),
            validations: Vec::new(),
            special_cases: Vec::new(),
            integration_points: Vec::new(),
            additional_notes: None,
        }
    }

    /// Appends a note, separated from existing notes by a blank line.
    pub fn append_note(&mut self, note: &str) {
        match self.additional_notes.as_mut() {
            Some(existing) if !existing.is_empty() => {
                existing.push_str("\n\n");
                existing.push_str(note);
            }
            _ => self.additional_notes = Some(note.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.core_rules.is_empty()
            && self.validations.is_empty()
            && self.special_cases.is_empty()
            && self.integration_points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Key/value pairs in the order the model listed them.
    #[serde(default)]
    pub test_data: Vec<(String, String)>,
    pub steps: Vec<String>,
    pub expected_results: Vec<String>,
    #[serde(default)]
    pub related_rules: Vec<String>,
}

impl TestCase {
    /// 只有 ID 與標題的測試案例，其餘欄位留空
    pub fn titled(test_id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            test_id: test_id.into(),
            description: title.clone(),
            title,
            prerequisites: Vec::new(),
            test_data: Vec::new(),
            steps: Vec::new(),
            expected_results: Vec::new(),
            related_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScript {
    pub program_name: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// An uploaded program that passed size and content checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramFile {
    pub name: String,
    pub content: String,
    pub program_type: ProgramType,
    pub size_bytes: usize,
    pub line_count: usize,
}

impl ProgramFile {
    /// File name without its extension.
    pub fn stem(&self) -> &str {
        std::path::Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramInfo {
    pub program_id: Option<String>,
    pub program_type: ProgramType,
    pub remarks: Vec<String>,
    pub history: Vec<String>,
    pub line_count: usize,
    pub sections: Vec<String>,
}

/// Model parameters shared by every LLM call of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            model: "llama3-8b-8192".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl CompletionRequest {
    pub fn new(prompt: Prompt, settings: &RequestSettings) -> Self {
        Self {
            system_prompt: prompt.system,
            user_prompt: prompt.user,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_seconds: settings.timeout_seconds,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}
