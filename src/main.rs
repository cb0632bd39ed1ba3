mod app;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use speech_trainer_lib::settings::{get_settings, SettingsStore};
use speech_trainer_lib::tasks::{builtin_tasks, parse_tasks};
use speech_trainer_lib::trainer::error_message;
use speech_trainer_lib::{DifficultyStore, EngineError, ModelSource, SessionConfig, SpeechTask};

/// Picture-and-word pronunciation practice in the terminal.
#[derive(Parser, Debug)]
#[command(name = "speech-trainer", version)]
struct Cli {
    /// Difficulty level to select and remember (easy, medium, hard).
    #[arg(short, long)]
    difficulty: Option<String>,

    /// Unpacked recognition model folder; overrides the stored setting.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Model archive to download when no local model exists.
    #[arg(long)]
    model_url: Option<String>,

    /// Log filter, e.g. `debug` or `speech_trainer_lib=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Give up on an attempt after this many seconds without a result; 0 disables.
    #[arg(long, default_value_t = 10)]
    listen_timeout_secs: u64,

    /// JSON task list to practice instead of the built-in one.
    #[arg(long)]
    tasks: Option<PathBuf>,
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.format_timestamp_secs().init();
}

fn load_tasks(path: Option<&PathBuf>) -> Result<Vec<SpeechTask>, EngineError> {
    let Some(path) = path else {
        return Ok(builtin_tasks());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::InvalidArgument(format!("{}: {e}", path.display())))?;
    parse_tasks(&raw)
}

fn report(err: &EngineError) -> ExitCode {
    log::error!("{err}");
    eprintln!("{}", error_message(err.kind()));
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let store = SettingsStore::open_default();
    let mut settings = get_settings(&store);
    if let Some(dir) = &cli.model_dir {
        settings.model_path = Some(dir.display().to_string());
    }
    if let Some(url) = &cli.model_url {
        settings.model_url = Some(url.clone());
    }
    let source = ModelSource::from_settings(&settings);

    let difficulty = DifficultyStore::new(store);
    if let Some(name) = cli.difficulty.as_deref() {
        if let Err(err) = difficulty.select_named(name) {
            return report(&err);
        }
    }

    let tasks = match load_tasks(cli.tasks.as_ref()) {
        Ok(tasks) => tasks,
        Err(err) => return report(&err),
    };

    let config = SessionConfig {
        listen_timeout: (cli.listen_timeout_secs > 0)
            .then(|| Duration::from_secs(cli.listen_timeout_secs)),
        ..SessionConfig::default()
    };

    run(source, config, tasks, difficulty).await
}

#[cfg(feature = "vosk")]
async fn run(
    source: ModelSource,
    config: SessionConfig,
    tasks: Vec<SpeechTask>,
    difficulty: DifficultyStore,
) -> ExitCode {
    use std::sync::Arc;

    use speech_trainer_lib::vosk_provider::VoskProvider;
    use speech_trainer_lib::{CpalMicrophone, ModelManager};

    let manager = ModelManager::new(VoskProvider, source);
    let outcome = app::run(
        manager.clone(),
        Arc::new(CpalMicrophone::new()),
        config,
        tasks,
        &difficulty,
    )
    .await;
    manager.teardown();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

#[cfg(not(feature = "vosk"))]
async fn run(
    source: ModelSource,
    _config: SessionConfig,
    _tasks: Vec<SpeechTask>,
    _difficulty: DifficultyStore,
) -> ExitCode {
    log::warn!("Built without a speech recognizer; model source {source:?} is unused");
    report(&EngineError::Unsupported)
}
