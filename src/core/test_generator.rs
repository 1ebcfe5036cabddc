use crate::adapters::llm::{complete_with_retry, RetryPolicy};
use crate::core::prompts;
use crate::core::test_parser::{default_test_cases, parse_test_script_response};
use crate::domain::model::{BusinessLogic, CompletionRequest, RequestSettings, TestCase, TestScript};
use crate::domain::ports::LlmClient;
use serde::{Deserialize, Serialize};

pub const MIN_TEST_CASES: usize = 3;

/// Which path produced the test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationPath {
    FirstAttempt,
    Retry,
    /// 重試仍不足，沿用第一次的結果
    FirstAttemptBelowMinimum,
    DefaultCases,
    ApiFailureDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGenerationOutcome {
    pub script: TestScript,
    pub path: GenerationPath,
    pub raw_response: Option<String>,
    pub error: Option<String>,
}

pub struct TestGenerator<'a, L: LlmClient + ?Sized> {
    client: &'a L,
    retry: RetryPolicy,
}

impl<'a, L: LlmClient + ?Sized> TestGenerator<'a, L> {
    pub fn new(client: &'a L, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn generate(
        &self,
        logic: &BusinessLogic,
        settings: &RequestSettings,
    ) -> TestGenerationOutcome {
        let program = logic.program_name.as_str();
        tracing::info!("🧪 Generating test scripts for {}", program);

        let request = CompletionRequest::new(prompts::test_script_prompt(logic), settings);
        let first_response = match complete_with_retry(self.client, &request, self.retry).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("❌ Test generation API error: {}", e);
                let mut cases = default_test_cases(program);
                cases.truncate(2);
                return TestGenerationOutcome {
                    script: script(program, cases),
                    path: GenerationPath::ApiFailureDefaults,
                    raw_response: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let first_cases = parse_test_script_response(&first_response);
        if first_cases.len() >= MIN_TEST_CASES {
            tracing::info!("✅ Generated {} test cases", first_cases.len());
            return TestGenerationOutcome {
                script: script(program, first_cases),
                path: GenerationPath::FirstAttempt,
                raw_response: Some(first_response),
                error: None,
            };
        }

        tracing::warn!(
            "⚠️ Initial generation produced {} test cases, retrying with stricter instructions",
            first_cases.len()
        );

        let retry_request = CompletionRequest::new(prompts::strict_test_script_prompt(logic), settings)
            .with_temperature(settings.temperature + 0.1);

        let retry_response = match complete_with_retry(self.client, &retry_request, self.retry).await {
            Ok(text) => {
                let retry_cases = parse_test_script_response(&text);
                if retry_cases.len() >= MIN_TEST_CASES {
                    tracing::info!("✅ Retry generated {} test cases", retry_cases.len());
                    return TestGenerationOutcome {
                        script: script(program, retry_cases),
                        path: GenerationPath::Retry,
                        raw_response: Some(text),
                        error: None,
                    };
                }
                Some(text)
            }
            Err(e) => {
                tracing::warn!("⚠️ Test generation retry failed: {}", e);
                None
            }
        };

        let raw_response = Some(match retry_response {
            Some(retry) => format!("{}\n\n{}", first_response, retry),
            None => first_response,
        });

        if first_cases.is_empty() {
            tracing::warn!("⚠️ Could not parse test cases, using default test cases");
            TestGenerationOutcome {
                script: script(program, default_test_cases(program)),
                path: GenerationPath::DefaultCases,
                raw_response,
                error: None,
            }
        } else {
            TestGenerationOutcome {
                script: script(program, first_cases),
                path: GenerationPath::FirstAttemptBelowMinimum,
                raw_response,
                error: None,
            }
        }
    }
}

fn script(program_name: &str, test_cases: Vec<TestCase>) -> TestScript {
    TestScript {
        program_name: program_name.to_string(),
        test_cases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ProgramType;
    use crate::utils::error::{AnalyzerError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        answers: Mutex<Vec<Result<String>>>,
        temperatures: Mutex<Vec<f32>>,
    }

    impl ScriptedClient {
        fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                temperatures: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.temperatures.lock().unwrap().push(request.temperature);
            self.answers.lock().unwrap().remove(0)
        }
    }

    fn cases(count: usize) -> String {
        (1..=count)
            .map(|i| {
                format!(
                    "Test ID: X800DN-TC-00{}\nTest Objective: Case {}\nTest Steps:\n1. Run\nExpected Results:\n- Ok\n\n",
                    i, i
                )
            })
            .collect()
    }

    fn logic() -> BusinessLogic {
        BusinessLogic::new("X800DN", ProgramType::Dc, "Customer inquiry")
    }

    fn settings() -> RequestSettings {
        RequestSettings {
            temperature: 0.3,
            ..RequestSettings::default()
        }
    }

    #[tokio::test]
    async fn test_first_attempt_with_enough_cases() {
        let client = ScriptedClient::new(vec![Ok(cases(5))]);
        let outcome = TestGenerator::new(&client, RetryPolicy::none())
            .generate(&logic(), &settings())
            .await;

        assert_eq!(outcome.path, GenerationPath::FirstAttempt);
        assert_eq!(outcome.script.test_cases.len(), 5);
        assert_eq!(outcome.script.program_name, "X800DN");
    }

    #[tokio::test]
    async fn test_retry_uses_higher_temperature() {
        let client = ScriptedClient::new(vec![Ok(cases(1)), Ok(cases(4))]);
        let outcome = TestGenerator::new(&client, RetryPolicy::none())
            .generate(&logic(), &settings())
            .await;

        assert_eq!(outcome.path, GenerationPath::Retry);
        assert_eq!(outcome.script.test_cases.len(), 4);
        let temperatures = client.temperatures.lock().unwrap().clone();
        assert_eq!(temperatures.len(), 2);
        assert!((temperatures[1] - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_keeps_first_result_when_retry_is_worse() {
        let client = ScriptedClient::new(vec![Ok(cases(2)), Ok("no test cases here".to_string())]);
        let outcome = TestGenerator::new(&client, RetryPolicy::none())
            .generate(&logic(), &settings())
            .await;

        assert_eq!(outcome.path, GenerationPath::FirstAttemptBelowMinimum);
        assert_eq!(outcome.script.test_cases.len(), 2);
    }

    #[tokio::test]
    async fn test_default_cases_when_nothing_parses() {
        let client = ScriptedClient::new(vec![
            Ok("nothing".to_string()),
            Err(AnalyzerError::TimeoutError { seconds: 120 }),
        ]);
        let outcome = TestGenerator::new(&client, RetryPolicy::none())
            .generate(&logic(), &settings())
            .await;

        assert_eq!(outcome.path, GenerationPath::DefaultCases);
        assert_eq!(outcome.script.test_cases.len(), 3);
        assert_eq!(outcome.script.test_cases[0].test_id, "X800DN-TC-001");
    }

    #[tokio::test]
    async fn test_api_failure_yields_two_default_cases() {
        let client = ScriptedClient::new(vec![Err(AnalyzerError::LlmStatusError {
            status: 500,
            body: "down".to_string(),
        })]);
        let outcome = TestGenerator::new(&client, RetryPolicy::none())
            .generate(&logic(), &settings())
            .await;

        assert_eq!(outcome.path, GenerationPath::ApiFailureDefaults);
        let titles: Vec<_> = outcome.script.test_cases.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Basic Functionality Test", "Validation Test"]);
        assert!(outcome.error.unwrap().contains("500"));
    }
}
