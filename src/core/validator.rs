use crate::adapters::llm::{complete_with_retry, RetryPolicy};
use crate::core::prompts;
use crate::domain::model::{BusinessLogic, CompletionRequest, RequestSettings};
use crate::domain::ports::LlmClient;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub logic: BusinessLogic,
    pub insights: Option<String>,
    /// 驗證呼叫失敗，沿用未驗證的內容
    pub bypassed: bool,
    pub error: Option<String>,
}

pub struct LogicValidator<'a, L: LlmClient + ?Sized> {
    client: &'a L,
    retry: RetryPolicy,
}

impl<'a, L: LlmClient + ?Sized> LogicValidator<'a, L> {
    pub fn new(client: &'a L, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Never fails: an LLM error yields the unvalidated logic with `bypassed` set.
    pub async fn validate(&self, logic: &BusinessLogic, settings: &RequestSettings) -> ValidationReport {
        tracing::info!("🔎 Validating business logic for {}", logic.program_name);

        let request = CompletionRequest::new(prompts::validation_prompt(logic), settings);

        match complete_with_retry(self.client, &request, self.retry).await {
            Ok(insights) => {
                let mut validated = logic.clone();
                validated.append_note(&format!("Validation Insights:\n{}", insights));
                tracing::info!("✅ Business logic validated successfully");

                ValidationReport {
                    logic: validated,
                    insights: Some(insights),
                    bypassed: false,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Validation failed, continuing with unvalidated logic: {}",
                    e.user_friendly_message()
                );

                ValidationReport {
                    logic: logic.clone(),
                    insights: None,
                    bypassed: true,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ProgramType;
    use crate::utils::error::{AnalyzerError, Result};
    use async_trait::async_trait;

    struct FixedClient(std::result::Result<&'static str, u16>);

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            assert!(request.user_prompt.contains("Validate the following business logic"));
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(AnalyzerError::LlmStatusError {
                    status,
                    body: "rate limited".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_validation_appends_insights() {
        let mut logic = BusinessLogic::new("X800DN", ProgramType::Dc, "Inquiry");
        logic.append_note("Conclusion:\ndone");
        let client = FixedClient(Ok("All rules are consistent."));

        let report = LogicValidator::new(&client, RetryPolicy::none())
            .validate(&logic, &RequestSettings::default())
            .await;

        assert!(!report.bypassed);
        assert_eq!(
            report.logic.additional_notes.as_deref(),
            Some("Conclusion:\ndone\n\nValidation Insights:\nAll rules are consistent.")
        );
        assert_eq!(report.insights.as_deref(), Some("All rules are consistent."));
    }

    #[tokio::test]
    async fn test_validation_failure_is_bypassed() {
        let logic = BusinessLogic::new("X800DN", ProgramType::Dc, "Inquiry");
        let client = FixedClient(Err(429));

        let report = LogicValidator::new(&client, RetryPolicy::none())
            .validate(&logic, &RequestSettings::default())
            .await;

        assert!(report.bypassed);
        assert_eq!(report.logic, logic);
        assert!(report.error.unwrap().contains("429"));
    }
}
