use crate::domain::model::{BusinessLogic, ProgramFile, RequestSettings, TestScript};
use crate::domain::ports::Storage;
use crate::utils::error::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowStep {
    Upload = 1,
    Extract = 2,
    Validate = 3,
    Generate = 4,
    Export = 5,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 5] = [
        WorkflowStep::Upload,
        WorkflowStep::Extract,
        WorkflowStep::Validate,
        WorkflowStep::Generate,
        WorkflowStep::Export,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    fn previous(&self) -> Option<WorkflowStep> {
        match self {
            WorkflowStep::Upload => None,
            WorkflowStep::Extract => Some(WorkflowStep::Upload),
            WorkflowStep::Validate => Some(WorkflowStep::Extract),
            WorkflowStep::Generate => Some(WorkflowStep::Validate),
            WorkflowStep::Export => Some(WorkflowStep::Generate),
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::Upload => "Upload",
            WorkflowStep::Extract => "Extract",
            WorkflowStep::Validate => "Validate",
            WorkflowStep::Generate => "Generate",
            WorkflowStep::Export => "Export",
        };
        write!(f, "{}", name)
    }
}

/// State carried between the five workflow steps; persisted as JSON between CLI runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub file: Option<ProgramFile>,
    pub business_logic: Option<BusinessLogic>,
    pub validated_logic: Option<BusinessLogic>,
    pub test_script: Option<TestScript>,
    pub raw_response: Option<String>,
    pub settings: RequestSettings,
    #[serde(default)]
    pub validation_bypassed: bool,
    pub current_step: WorkflowStep,
}

impl WorkflowSession {
    pub fn new(settings: RequestSettings) -> Self {
        Self {
            file: None,
            business_logic: None,
            validated_logic: None,
            test_script: None,
            raw_response: None,
            settings,
            validation_bypassed: false,
            current_step: WorkflowStep::Upload,
        }
    }

    fn missing_prerequisite(&self, step: WorkflowStep) -> Option<&'static str> {
        match step {
            WorkflowStep::Upload => None,
            WorkflowStep::Extract => self.file.is_none().then_some("no program file uploaded"),
            WorkflowStep::Validate => self
                .business_logic
                .is_none()
                .then_some("business logic has not been extracted"),
            WorkflowStep::Generate => self
                .validated_logic
                .is_none()
                .then_some("business logic has not been validated"),
            WorkflowStep::Export => self
                .test_script
                .is_none()
                .then_some("test scripts have not been generated"),
        }
    }

    pub fn can_enter(&self, step: WorkflowStep) -> bool {
        self.missing_prerequisite(step).is_none()
    }

    pub fn advance_to(&mut self, step: WorkflowStep) -> Result<()> {
        if let Some(missing) = self.missing_prerequisite(step) {
            return Err(AnalyzerError::WorkflowError {
                message: format!("cannot enter the {} step: {}", step, missing),
            });
        }
        tracing::debug!("Workflow moved from {} to {}", self.current_step, step);
        self.current_step = step;
        Ok(())
    }

    /// Extracted logic without a validation result is carried forward as-is.
    /// Returns true when validation was bypassed by this call.
    pub fn ensure_progression(&mut self) -> bool {
        match (&self.business_logic, &self.validated_logic) {
            (Some(logic), None) => {
                tracing::warn!("⚠️ Validation skipped, using extracted business logic as validated");
                self.validated_logic = Some(logic.clone());
                self.validation_bypassed = true;
                true
            }
            _ => false,
        }
    }

    pub fn set_file(&mut self, file: ProgramFile) {
        self.file = Some(file);
        self.business_logic = None;
        self.raw_response = None;
        self.clear_validation();
        self.test_script = None;
        self.fall_back_to_enterable_step();
    }

    pub fn set_business_logic(&mut self, logic: BusinessLogic, raw_response: Option<String>) {
        self.business_logic = Some(logic);
        self.raw_response = raw_response;
        self.clear_validation();
        self.test_script = None;
        self.fall_back_to_enterable_step();
    }

    pub fn set_validated_logic(&mut self, logic: BusinessLogic, bypassed: bool) {
        self.validated_logic = Some(logic);
        self.validation_bypassed = bypassed;
        self.test_script = None;
        self.fall_back_to_enterable_step();
    }

    pub fn set_test_script(&mut self, script: TestScript) {
        self.test_script = Some(script);
    }

    fn clear_validation(&mut self) {
        self.validated_logic = None;
        self.validation_bypassed = false;
    }

    fn fall_back_to_enterable_step(&mut self) {
        while !self.can_enter(self.current_step) {
            match self.current_step.previous() {
                Some(step) => self.current_step = step,
                None => break,
            }
        }
    }

    /// 0.0 at Upload, 1.0 at Export.
    pub fn progress(&self) -> f32 {
        f32::from(self.current_step.number() - 1) / 4.0
    }

    /// Clears every result but keeps the model settings.
    pub fn reset(&mut self) {
        *self = Self::new(self.settings.clone());
    }

    /// Program name of the most processed logic available.
    pub fn program_name(&self) -> Option<&str> {
        self.validated_logic
            .as_ref()
            .or(self.business_logic.as_ref())
            .map(|logic| logic.program_name.as_str())
            .or_else(|| self.file.as_ref().map(|file| file.stem()))
    }

    pub async fn save<S: Storage>(&self, storage: &S, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        storage.write_file(path, json.as_bytes()).await?;
        tracing::debug!("Session saved to {}", storage.location(path));
        Ok(())
    }

    pub async fn load<S: Storage>(storage: &S, path: &str) -> Result<Self> {
        let data = storage.read_file(path).await?;
        let session: Self = serde_json::from_slice(&data)?;
        tracing::debug!(
            "Session loaded from {} at step {}",
            storage.location(path),
            session.current_step
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ProgramType, TestCase};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemoryStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                AnalyzerError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn location(&self, path: &str) -> String {
            format!("memory://{}", path)
        }
    }

    fn program_file() -> ProgramFile {
        ProgramFile {
            name: "X800DN.cbl".to_string(),
            content: "       IDENTIFICATION DIVISION.\n".to_string(),
            program_type: ProgramType::Dc,
            size_bytes: 32,
            line_count: 1,
        }
    }

    fn logic() -> BusinessLogic {
        BusinessLogic::new("X800DN", ProgramType::Dc, "Customer inquiry")
    }

    fn script() -> TestScript {
        TestScript {
            program_name: "X800DN".to_string(),
            test_cases: vec![TestCase::titled("X800DN-TC-001", "Lookup")],
        }
    }

    fn completed_session() -> WorkflowSession {
        let mut session = WorkflowSession::new(RequestSettings::default());
        session.set_file(program_file());
        session.set_business_logic(logic(), Some("raw".to_string()));
        session.set_validated_logic(logic(), false);
        session.set_test_script(script());
        session
    }

    #[test]
    fn test_step_prerequisites() {
        let mut session = WorkflowSession::new(RequestSettings::default());
        assert!(session.can_enter(WorkflowStep::Upload));
        assert!(!session.can_enter(WorkflowStep::Extract));

        session.set_file(program_file());
        assert!(session.can_enter(WorkflowStep::Extract));
        assert!(!session.can_enter(WorkflowStep::Validate));

        session.set_business_logic(logic(), None);
        assert!(session.can_enter(WorkflowStep::Validate));
        assert!(!session.can_enter(WorkflowStep::Generate));
    }

    #[test]
    fn test_advance_without_prerequisite_fails() {
        let mut session = WorkflowSession::new(RequestSettings::default());
        let err = session.advance_to(WorkflowStep::Generate).unwrap_err();

        assert!(matches!(err, AnalyzerError::WorkflowError { .. }));
        assert!(err.to_string().contains("Generate"));
        assert_eq!(session.current_step, WorkflowStep::Upload);
    }

    #[test]
    fn test_ensure_progression_bypasses_validation() {
        let mut session = WorkflowSession::new(RequestSettings::default());
        session.set_file(program_file());
        session.set_business_logic(logic(), None);

        assert!(session.ensure_progression());
        assert!(session.validation_bypassed);
        assert_eq!(session.validated_logic, Some(logic()));
        assert!(session.advance_to(WorkflowStep::Generate).is_ok());

        // 已驗證時不再變動
        assert!(!session.ensure_progression());
    }

    #[test]
    fn test_reextract_clears_downstream_results() {
        let mut session = completed_session();
        session.advance_to(WorkflowStep::Export).unwrap();

        session.set_business_logic(logic(), Some("second run".to_string()));

        assert!(session.validated_logic.is_none());
        assert!(session.test_script.is_none());
        assert_eq!(session.current_step, WorkflowStep::Validate);
        assert_eq!(session.raw_response.as_deref(), Some("second run"));
    }

    #[test]
    fn test_revalidate_clears_tests_only() {
        let mut session = completed_session();
        session.set_validated_logic(logic(), true);

        assert!(session.business_logic.is_some());
        assert!(session.test_script.is_none());
        assert!(session.validation_bypassed);
    }

    #[test]
    fn test_progress_and_reset() {
        let mut session = completed_session();
        assert_eq!(session.progress(), 0.0);

        session.advance_to(WorkflowStep::Validate).unwrap();
        assert_eq!(session.progress(), 0.5);
        session.advance_to(WorkflowStep::Export).unwrap();
        assert_eq!(session.progress(), 1.0);

        session.settings.temperature = 0.7;
        session.reset();
        assert!(session.file.is_none());
        assert_eq!(session.current_step, WorkflowStep::Upload);
        assert_eq!(session.settings.temperature, 0.7);
    }

    #[test]
    fn test_program_name_prefers_validated_logic() {
        let mut session = WorkflowSession::new(RequestSettings::default());
        assert_eq!(session.program_name(), None);
        session.set_file(program_file());
        assert_eq!(session.program_name(), Some("X800DN"));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let storage = MemoryStorage::default();
        let mut session = completed_session();
        session.advance_to(WorkflowStep::Generate).unwrap();

        session.save(&storage, SESSION_FILE).await.unwrap();
        let loaded = WorkflowSession::load(&storage, SESSION_FILE).await.unwrap();

        assert_eq!(loaded, session);
        assert_eq!(loaded.current_step, WorkflowStep::Generate);
    }

    #[tokio::test]
    async fn test_load_missing_session_fails() {
        let storage = MemoryStorage::default();
        let result = WorkflowSession::load(&storage, SESSION_FILE).await;
        assert!(matches!(result, Err(AnalyzerError::IoError(_))));
    }
}
