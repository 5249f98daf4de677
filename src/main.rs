use churn_predict::config::toml_config::AppConfig;
use churn_predict::core::csv_codec;
use churn_predict::core::upload::format_file_size;
use churn_predict::core::ConfigProvider;
use churn_predict::domain::model::DownloadArtifact;
use churn_predict::utils::{logger, validation::Validate};
use churn_predict::{
    open_engine, prediction_service, CancelToken, ChurnError, CliConfig, Command, HistoryCommand,
    HistoryStore, LocalStorage, ProcessingState, UploadCandidate, UploadGate,
};
use clap::Parser;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting churn-predict CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.load_app_config() {
        Ok(config) => config,
        Err(e) => report_and_exit(e),
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        report_and_exit(e);
    }

    let outcome = match &cli.command {
        Command::Analyze { file, .. } => run_analyze(&config, file).await,
        Command::History(command) => run_history(&config, command).await,
    };

    if let Err(e) = outcome {
        report_and_exit(e);
    }

    Ok(())
}

async fn run_analyze(config: &AppConfig, file: &Path) -> churn_predict::Result<()> {
    let mut gate = UploadGate::new(config.max_upload_bytes());
    let candidate = gate.select(UploadCandidate::from_path(file).await?)?.clone();
    println!(
        "📄 {} ({})",
        candidate.name,
        format_file_size(candidate.size)
    );

    let service = prediction_service(config)?;
    let mut engine = open_engine(config, service).await;

    // Ctrl-C 取消進行中的分析
    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, cancelling analysis");
            interrupt.cancel();
        }
    });

    let mut updates = engine.subscribe();
    let progress_task = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let update = updates.borrow_and_update().clone();
            match update.state {
                ProcessingState::Uploading => println!("⏳ Uploading file..."),
                ProcessingState::Processing => println!(
                    "🔄 Analyzing {} customer records... {:.0}%",
                    update.records_processed, update.progress
                ),
                ProcessingState::Idle | ProcessingState::Completed | ProcessingState::Error => {
                    break
                }
            }
        }
    });

    let outcome = engine.analyze(&candidate, &cancel).await;
    signal_task.abort();
    progress_task.abort();
    let outcome = outcome?;

    let result = &outcome.result;
    println!("✅ Analysis complete!");
    println!("   Total records: {}", result.total_records);
    println!("   Likely to churn: {}", result.churn_count);
    println!("   Likely to stay: {}", result.retain_count);
    println!("   Churn rate: {:.1}%", result.churn_rate);

    if let Some(warning) = &outcome.storage_warning {
        eprintln!("⚠️ {}", warning.user_friendly_message());
    }

    if let Some(artifact) = engine.export_results() {
        let path = write_artifact(config.output_dir(), &artifact).await?;
        println!("📁 Predictions saved to: {}", path.display());
    }

    Ok(())
}

async fn run_history(config: &AppConfig, command: &HistoryCommand) -> churn_predict::Result<()> {
    let storage = LocalStorage::new(config.data_dir()).with_quota(config.storage_quota_bytes());
    let mut store = HistoryStore::open(storage, config.history_key(), config.max_history()).await;

    match command {
        HistoryCommand::List => {
            let items = store.snapshot();
            if items.is_empty() {
                println!("No previous analyses");
                return Ok(());
            }

            let noun = if items.len() == 1 { "analysis" } else { "analyses" };
            println!("🕘 {} previous {}", items.len(), noun);
            for item in items.iter() {
                println!(
                    "{}  {}  {}  {} records  {:.1}% churn",
                    item.id,
                    item.date
                        .with_timezone(&chrono::Local)
                        .format("%b %-d, %Y, %I:%M %p"),
                    item.filename,
                    item.records_processed,
                    item.churn_rate
                );
            }
        }
        HistoryCommand::Download { id, .. } => match store.get(id) {
            Some(item) => {
                let artifact = csv_codec::build_artifact(&item.filename, &item.data);
                let path = write_artifact(config.output_dir(), &artifact).await?;
                println!("📁 Report downloaded to: {}", path.display());
            }
            None => println!("No history entry with id {}", id),
        },
        HistoryCommand::Delete { id } => {
            let outcome = store.delete(id).await;
            if outcome.value {
                println!("🗑️ Prediction removed from history");
            } else {
                println!("No history entry with id {}", id);
            }
            if let Some(warning) = &outcome.warning {
                eprintln!("⚠️ {}", warning.user_friendly_message());
            }
        }
        HistoryCommand::Clear => {
            let outcome = store.clear().await;
            println!("🗑️ History cleared");
            if let Some(warning) = &outcome.warning {
                eprintln!("⚠️ {}", warning.user_friendly_message());
            }
        }
    }

    Ok(())
}

async fn write_artifact(dir: &str, artifact: &DownloadArtifact) -> churn_predict::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = Path::new(dir).join(&artifact.filename);
    tokio::fs::write(&path, artifact.contents.as_bytes()).await?;
    tracing::debug!("Wrote {} bytes to {}", artifact.contents.len(), path.display());
    Ok(path)
}

fn report_and_exit(e: ChurnError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ churn-predict failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    std::process::exit(e.exit_code())
}
