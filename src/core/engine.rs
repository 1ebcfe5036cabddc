use crate::adapters::llm::RetryPolicy;
use crate::core::chunker::Chunker;
use crate::core::document::{self, MetadataValue};
use crate::core::extractor::{placeholder_logic, ExtractionOutcome, LogicExtractor};
use crate::core::test_generator::{TestGenerationOutcome, TestGenerator};
use crate::core::upload::extract_program_information;
use crate::core::validator::{LogicValidator, ValidationReport};
use crate::core::workflow::{WorkflowSession, WorkflowStep};
use crate::domain::model::ProgramFile;
use crate::domain::ports::{ConfigProvider, LlmClient, Storage};
use crate::utils::error::{AnalyzerError, Result};
use crate::utils::monitor::StepMonitor;
use serde::{Deserialize, Serialize};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub program_name: String,
    /// Locations of every written file, bundle last.
    pub files: Vec<String>,
    pub bundle: String,
    pub validation_bypassed: bool,
}

/// Program name reduced to `[A-Za-z0-9_-]` for use in output file names.
pub fn file_stem(program_name: &str) -> String {
    let stem: String = program_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "program".to_string()
    } else {
        stem.to_string()
    }
}

pub fn bundle_file_name(program_name: &str) -> String {
    format!("{}_analysis.zip", program_name)
}

pub fn session_file_name(program_name: &str) -> String {
    format!("{}_session.json", program_name)
}

pub fn raw_response_file_name(program_name: &str) -> String {
    format!("{}_raw_response.txt", program_name)
}

/// Drives one program through upload → extract → validate → generate → export.
pub struct AnalyzerEngine<S: Storage, C: ConfigProvider, L: LlmClient> {
    storage: S,
    config: C,
    client: L,
    monitor: StepMonitor,
}

impl<S: Storage, C: ConfigProvider, L: LlmClient> AnalyzerEngine<S, C, L> {
    pub fn new(storage: S, config: C, client: L) -> Self {
        Self {
            storage,
            config,
            client,
            monitor: StepMonitor::default(),
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = StepMonitor::new(enabled);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn new_session(&self) -> WorkflowSession {
        WorkflowSession::new(self.config.request_settings())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.retry_attempts(), self.config.retry_delay_ms())
    }

    pub fn upload(&self, session: &mut WorkflowSession, file: ProgramFile) -> Result<()> {
        tracing::info!("📄 Step 1/5: Upload {}", file.name);
        session.set_file(file);
        session.advance_to(WorkflowStep::Extract)?;
        self.monitor.log_step("Upload");
        Ok(())
    }

    /// With `force`, a failed extraction continues with placeholder logic instead of failing.
    pub async fn extract(&self, session: &mut WorkflowSession, force: bool) -> Result<()> {
        session.advance_to(WorkflowStep::Extract)?;
        let file = session.file.clone().ok_or_else(|| AnalyzerError::WorkflowError {
            message: "no program file uploaded".to_string(),
        })?;
        tracing::info!("🔍 Step 2/5: Extract business logic from {}", file.name);

        let extractor = LogicExtractor::new(
            &self.client,
            Chunker::new(self.config.max_chunk_size()),
            self.config.sample_size(),
            self.retry_policy(),
        );

        match extractor.extract(&file, &session.settings).await {
            Ok(ExtractionOutcome {
                logic,
                raw_response,
                chunk_count,
                ..
            }) => {
                tracing::info!("✅ Extraction finished over {} chunk(s)", chunk_count);
                session.set_business_logic(logic, Some(raw_response));
            }
            Err(e) if force => {
                tracing::warn!(
                    "⚠️ Extraction failed ({}), continuing with placeholder business logic",
                    e
                );
                session.set_business_logic(placeholder_logic(&file), None);
            }
            Err(e) => return Err(e),
        }

        session.advance_to(WorkflowStep::Validate)?;
        self.monitor.log_step("Extract");
        Ok(())
    }

    pub async fn validate(&self, session: &mut WorkflowSession) -> Result<ValidationReport> {
        session.advance_to(WorkflowStep::Validate)?;
        let logic = session
            .business_logic
            .clone()
            .ok_or_else(|| AnalyzerError::WorkflowError {
                message: "business logic has not been extracted".to_string(),
            })?;
        tracing::info!("🔎 Step 3/5: Validate business logic");

        let report = LogicValidator::new(&self.client, self.retry_policy())
            .validate(&logic, &session.settings)
            .await;
        session.set_validated_logic(report.logic.clone(), report.bypassed);

        session.advance_to(WorkflowStep::Generate)?;
        self.monitor.log_step("Validate");
        Ok(report)
    }

    pub async fn generate(&self, session: &mut WorkflowSession) -> Result<TestGenerationOutcome> {
        session.ensure_progression();
        session.advance_to(WorkflowStep::Generate)?;
        let logic = session
            .validated_logic
            .clone()
            .ok_or_else(|| AnalyzerError::WorkflowError {
                message: "business logic has not been validated".to_string(),
            })?;
        tracing::info!("🧪 Step 4/5: Generate test scripts");

        let outcome = TestGenerator::new(&self.client, self.retry_policy())
            .generate(&logic, &session.settings)
            .await;
        tracing::info!(
            "Generated {} test cases via {:?}",
            outcome.script.test_cases.len(),
            outcome.path
        );
        session.set_test_script(outcome.script.clone());

        session.advance_to(WorkflowStep::Export)?;
        self.monitor.log_step("Generate");
        Ok(outcome)
    }

    /// Writes every document plus the session and raw responses, then bundles them in a zip.
    pub async fn export(&self, session: &mut WorkflowSession) -> Result<ExportReport> {
        session.advance_to(WorkflowStep::Export)?;
        let program_name = session
            .program_name()
            .ok_or_else(|| AnalyzerError::WorkflowError {
                message: "nothing to export".to_string(),
            })?
            .to_string();
        tracing::info!("📦 Step 5/5: Export results for {}", program_name);
        let stem = file_stem(&program_name);

        let mut outputs: Vec<(String, Vec<u8>)> = Vec::new();

        if let Some(logic) = &session.business_logic {
            outputs.push((
                document::business_logic_file_name(&stem),
                document::render_business_logic(logic)?,
            ));
        }
        if let Some(logic) = &session.validated_logic {
            outputs.push((
                document::validated_logic_file_name(&stem),
                document::render_business_logic(logic)?,
            ));
        }
        if let Some(script) = &session.test_script {
            outputs.push((
                document::test_script_file_name(&stem),
                document::render_test_script(script)?,
            ));
        }
        if let Some(raw) = session.raw_response.as_deref().filter(|r| !r.trim().is_empty()) {
            let metadata: Option<Vec<(String, MetadataValue)>> = session
                .file
                .as_ref()
                .map(|file| document::program_metadata(&extract_program_information(&file.content)));
            outputs.push((
                document::raw_analysis_file_name(&stem),
                document::render_markdown_report(
                    raw,
                    &format!("{} Raw Analysis", program_name),
                    metadata.as_deref(),
                )?,
            ));
            outputs.push((raw_response_file_name(&stem), raw.as_bytes().to_vec()));
        }
        outputs.push((
            session_file_name(&stem),
            serde_json::to_string_pretty(&*session)?.into_bytes(),
        ));

        let mut files = Vec::with_capacity(outputs.len() + 1);
        for (name, data) in &outputs {
            tracing::debug!("Writing {} ({} bytes)", name, data.len());
            self.storage.write_file(name, data).await?;
            files.push(self.storage.location(name));
        }

        let bundle_name = bundle_file_name(&stem);
        let bundle = bundle_outputs(&outputs)?;
        tracing::debug!("Writing ZIP file ({} bytes) to storage", bundle.len());
        self.storage.write_file(&bundle_name, &bundle).await?;
        let bundle_location = self.storage.location(&bundle_name);
        files.push(bundle_location.clone());

        tracing::info!("✅ Exported {} files to {}", files.len(), bundle_location);
        self.monitor.log_step("Export");

        Ok(ExportReport {
            program_name,
            files,
            bundle: bundle_location,
            validation_bypassed: session.validation_bypassed,
        })
    }

    /// Runs all five steps on a fresh session.
    pub async fn run(&self, file: ProgramFile, force: bool) -> Result<ExportReport> {
        tracing::info!("Starting analysis of {}", file.name);
        let mut session = self.new_session();

        self.upload(&mut session, file)?;
        self.extract(&mut session, force).await?;
        self.validate(&mut session).await?;
        self.generate(&mut session).await?;
        let report = self.export(&mut session).await?;

        self.monitor.log_summary();
        Ok(report)
    }
}

fn bundle_outputs(outputs: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in outputs {
        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(data)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}
