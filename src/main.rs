use clap::Parser;
use idms_analyzer::config::{Command, ProgramArgs};
use idms_analyzer::core::upload::extract_program_information;
use idms_analyzer::core::{ConfigProvider, Storage};
use idms_analyzer::utils::error::ErrorSeverity;
use idms_analyzer::utils::{logger, validation::Validate};
use idms_analyzer::{
    AnalyzerConfig, AnalyzerEngine, Cli, ExportReport, GroqClient, LocalStorage, Result,
    WorkflowSession,
};

type Engine = AnalyzerEngine<LocalStorage, AnalyzerConfig, GroqClient>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting idms-analyzer");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    if let Err(e) = execute(cli).await {
        tracing::error!(
            "❌ Analysis failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn load_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path.display());
            AnalyzerConfig::from_file(path)?
        }
        None => AnalyzerConfig::default(),
    };

    config.apply_overrides(&cli.overrides());
    config.validate()?;
    tracing::info!(
        "✅ Configuration ready (model: {}, sample: {})",
        config.llm.model,
        config
            .processing
            .sample_size
            .map_or("full file".to_string(), |n| format!("first {} characters", n))
    );
    Ok(config)
}

async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    if let Command::Inspect(args) = &cli.command {
        return inspect(args);
    }

    let client = GroqClient::new(config.llm.base_url.clone(), config.api_key()?);
    let storage = LocalStorage::new(config.output_path());
    let engine: Engine = AnalyzerEngine::new(storage, config, client).with_monitoring(cli.monitor);

    match &cli.command {
        Command::Run { program, force } => {
            let report = engine.run(program.load()?, *force).await?;
            print_export(&report);
        }
        Command::Extract { program, force } => {
            let mut session = engine.new_session();
            engine.upload(&mut session, program.load()?)?;
            engine.extract(&mut session, *force).await?;
            save_session(&engine, &session, &cli.session).await?;

            if let Some(logic) = &session.business_logic {
                println!(
                    "✅ Extracted {}: {} rules, {} validations, {} special cases, {} integration points",
                    logic.program_name,
                    logic.core_rules.len(),
                    logic.validations.len(),
                    logic.special_cases.len(),
                    logic.integration_points.len()
                );
            }
        }
        Command::Validate => {
            let mut session = load_session(&engine, &cli).await?;
            let report = engine.validate(&mut session).await?;
            save_session(&engine, &session, &cli.session).await?;

            if report.bypassed {
                println!("⚠️ Validation failed, continuing with the unvalidated business logic");
            } else {
                println!("✅ Business logic validated");
            }
        }
        Command::Generate => {
            let mut session = load_session(&engine, &cli).await?;
            let outcome = engine.generate(&mut session).await?;
            save_session(&engine, &session, &cli.session).await?;
            println!(
                "✅ Generated {} test cases ({:?})",
                outcome.script.test_cases.len(),
                outcome.path
            );
        }
        Command::Export => {
            let mut session = load_session(&engine, &cli).await?;
            let report = engine.export(&mut session).await?;
            save_session(&engine, &session, &cli.session).await?;
            print_export(&report);
        }
        Command::Inspect(_) => {}
    }

    Ok(())
}

async fn load_session(engine: &Engine, cli: &Cli) -> Result<WorkflowSession> {
    let mut session = WorkflowSession::load(engine.storage(), &cli.session).await?;

    // 命令列指定模型參數時覆蓋 session 中的設定
    let model = &cli.model;
    if model.model.is_some()
        || model.temperature.is_some()
        || model.max_tokens.is_some()
        || model.timeout.is_some()
    {
        session.settings = engine.config().request_settings();
    }

    tracing::info!(
        "📂 Resumed session at step {} ({:.0}% complete)",
        session.current_step,
        session.progress() * 100.0
    );
    Ok(session)
}

async fn save_session(engine: &Engine, session: &WorkflowSession, path: &str) -> Result<()> {
    session.save(engine.storage(), path).await?;
    println!("💾 Session saved to {}", engine.storage().location(path));
    Ok(())
}

fn inspect(args: &ProgramArgs) -> Result<()> {
    let file = args.load()?;
    let info = extract_program_information(&file.content);

    println!("📄 {}", file.name);
    println!("   Size: {} bytes, {} lines", file.size_bytes, file.line_count);
    println!("   Program type: {}", file.program_type.label());
    println!(
        "   Program ID: {}",
        info.program_id.as_deref().unwrap_or("(not found)")
    );
    if !info.remarks.is_empty() {
        println!("   Remarks: {}", info.remarks.join(" "));
    }
    if !info.sections.is_empty() {
        println!("   Sections/paragraphs: {}", info.sections.join(", "));
    }
    Ok(())
}

fn print_export(report: &ExportReport) {
    println!("✅ Analysis of {} exported", report.program_name);
    if report.validation_bypassed {
        println!("⚠️ Validation was bypassed; documents use the unvalidated business logic");
    }
    for file in &report.files {
        println!("📁 {}", file);
    }
}
