pub mod cli;
pub mod toml_config;

use crate::core::workflow::SESSION_FILE;
use crate::domain::model::{ProgramFile, ProgramType};
use crate::utils::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use toml_config::ConfigOverrides;

#[derive(Debug, Clone, Parser)]
#[command(name = "idms-analyzer")]
#[command(about = "Extract business logic and test scripts from IDMS/COBOL programs")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output directory (overrides processing.output_path)
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Session file, relative to the output directory
    #[arg(long, global = true, default_value = SESSION_FILE)]
    pub session: String,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per step")]
    pub monitor: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ModelArgs {
    /// LLM model, e.g. llama3-8b-8192, llama3-70b-8192, mixtral-8x7b-32768
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// API timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Analyse only the first N characters of the program
    #[arg(long, global = true, conflicts_with = "full_file")]
    pub sample_size: Option<usize>,

    /// Analyse the whole program instead of a sample
    #[arg(long, global = true)]
    pub full_file: bool,

    #[arg(long, global = true)]
    pub max_chunk_size: Option<usize>,

    /// Chat completions base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ProgramArgs {
    /// COBOL/IDMS source file
    pub file: PathBuf,

    /// Treat the file as having this extension
    #[arg(long)]
    pub extension: Option<String>,

    /// Override the detected program type (DC, DB, Online, Batch)
    #[arg(long)]
    pub program_type: Option<ProgramType>,
}

impl ProgramArgs {
    /// Reads and validates the program file.
    pub fn load(&self) -> Result<ProgramFile> {
        let bytes = std::fs::read(&self.file)?;
        let name = self
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("program.cbl");
        let mut program = ProgramFile::from_bytes(name, &bytes, self.extension.as_deref())?;

        if let Some(program_type) = self.program_type {
            if program_type != program.program_type {
                tracing::info!(
                    "🔧 Treating {} as {} (detected {})",
                    program.name,
                    program_type.label(),
                    program.program_type.label()
                );
            }
            program.program_type = program_type;
        }
        Ok(program)
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a program file and show what was detected, without calling the LLM
    Inspect(ProgramArgs),
    /// Upload a program and extract its business logic into the session
    Extract {
        #[command(flatten)]
        program: ProgramArgs,
        /// Continue with placeholder business logic when extraction fails
        #[arg(long)]
        force: bool,
    },
    /// Validate the extracted business logic in the session
    Validate,
    /// Generate test scripts from the validated business logic in the session
    Generate,
    /// Write documents and the zip bundle for the session
    Export,
    /// Run every step on a program in one go
    Run {
        #[command(flatten)]
        program: ProgramArgs,
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.model.base_url.clone(),
            model: self.model.model.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            timeout_seconds: self.model.timeout,
            sample_size: self.model.sample_size,
            full_file: self.model.full_file,
            max_chunk_size: self.model.max_chunk_size,
            output_path: self.output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "idms-analyzer",
            "run",
            "X800DN.cbl",
            "--force",
            "--model",
            "llama3-70b-8192",
            "--full-file",
            "-o",
            "reports",
        ]);

        match &cli.command {
            Command::Run { program, force } => {
                assert_eq!(program.file, PathBuf::from("X800DN.cbl"));
                assert!(*force);
            }
            other => panic!("unexpected command {:?}", other),
        }
        let overrides = cli.overrides();
        assert_eq!(overrides.model.as_deref(), Some("llama3-70b-8192"));
        assert!(overrides.full_file);
        assert_eq!(overrides.output_path.as_deref(), Some("reports"));
        assert_eq!(cli.session, SESSION_FILE);
    }

    #[test]
    fn test_step_commands_take_no_file() {
        let cli = Cli::parse_from(["idms-analyzer", "--verbose", "validate"]);
        assert!(matches!(cli.command, Command::Validate));
        assert!(cli.verbose);
    }

    #[test]
    fn test_program_type_override() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("B100DB.cbl");
        std::fs::write(
            &path,
            "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. B100DB.\n       DATA DIVISION.\n       WORKING-STORAGE SECTION.\n       01  WS-AMOUNT  PIC 9(7).\n       PROCEDURE DIVISION USING SUBSCHEMA-NAMES.\n",
        )?;
        let path = path.display().to_string();

        let detected = Cli::parse_from(["idms-analyzer", "inspect", &path]);
        let Command::Inspect(args) = &detected.command else {
            panic!("unexpected command {:?}", detected.command);
        };
        assert_eq!(args.load()?.program_type, ProgramType::Db);

        let forced = Cli::parse_from(["idms-analyzer", "inspect", &path, "--program-type", "online"]);
        let Command::Inspect(args) = &forced.command else {
            panic!("unexpected command {:?}", forced.command);
        };
        assert_eq!(args.program_type, Some(ProgramType::Dc));
        assert_eq!(args.load()?.program_type, ProgramType::Dc);

        let rejected =
            Cli::try_parse_from(["idms-analyzer", "inspect", &path, "--program-type", "CICS"]);
        assert!(rejected.is_err());
        Ok(())
    }

    #[test]
    fn test_sample_size_conflicts_with_full_file() {
        let result = Cli::try_parse_from([
            "idms-analyzer",
            "extract",
            "a.cbl",
            "--sample-size",
            "2000",
            "--full-file",
        ]);
        assert!(result.is_err());
    }
}
