//! The interactive practice loop.
#![cfg_attr(not(feature = "vosk"), allow(dead_code))]

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use speech_trainer_lib::trainer::{
    error_message, feedback_message, run_attempt, AttemptOutcome, Step, COMPLETION_TEXT,
    COMPLETION_TITLE,
};
use speech_trainer_lib::{
    DifficultyStore, EngineError, MicrophoneSource, ModelManager, ModelStatus,
    RecognitionSession, RecognizerProvider, SessionConfig, SpeechTask, Trainer,
};

const QUIT: [&str; 3] = ["q", "quit", "выход"];
const YES: [&str; 4] = ["", "y", "yes", "да"];

struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` on end of input.
    async fn read_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line.map(|l| l.trim().to_lowercase()),
            Err(e) => {
                log::warn!("Failed to read from stdin: {e}");
                None
            }
        }
    }
}

pub async fn run<P: RecognizerProvider>(
    manager: ModelManager<P>,
    microphone: Arc<dyn MicrophoneSource>,
    config: SessionConfig,
    tasks: Vec<SpeechTask>,
    difficulty: &DifficultyStore,
) -> Result<(), EngineError> {
    let mut trainer = Trainer::new(tasks)?;

    let _progress = manager.subscribe_progress(|percent| {
        if *percent % 10 == 0 {
            println!("Загрузка модели распознавания: {percent}%");
        }
    });
    let _status = manager.subscribe_status(|status| {
        if let ModelStatus::Failed(reason) = status {
            log::error!("Model load failed: {reason}");
        }
    });

    println!("Подготовка модели распознавания речи...");
    manager.request_model().await?;

    let session = RecognitionSession::new(manager, microphone, config);
    let mut console = Console::new();

    println!(
        "Уровень сложности: {}. Введите easy, medium или hard, чтобы изменить его.",
        difficulty.current().label()
    );

    loop {
        let Some(task) = trainer.current().cloned() else {
            println!("{COMPLETION_TITLE} {COMPLETION_TEXT}");
            println!("Начать заново? (да/нет)");
            match console.read_line().await {
                Some(answer) if YES.contains(&answer.as_str()) => {
                    trainer.restart();
                    continue;
                }
                _ => break,
            }
        };

        println!();
        println!(
            "Задание {} из {} ({}%): {} [{}]",
            trainer.position(),
            trainer.len(),
            trainer.progress_percent(),
            task.prompt,
            task.image
        );
        println!("Нажмите Enter и произнесите слово.");

        let Some(input) = console.read_line().await else {
            break;
        };
        if QUIT.contains(&input.as_str()) {
            break;
        }
        if !input.is_empty() {
            match difficulty.select_named(&input) {
                Ok(level) => println!("Уровень сложности: {}", level.label()),
                Err(err) => println!("{}", error_message(err.kind())),
            }
            continue;
        }

        println!("Слушаю...");
        match run_attempt(&mut trainer, &session, &difficulty.current_profile()).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(err) => {
                log::warn!("Attempt failed: {err}");
                println!("{}", error_message(err.kind()));
            }
        }
    }

    session.stop();
    log::info!("Practice finished");
    Ok(())
}

fn print_outcome(outcome: &AttemptOutcome) {
    if !outcome.transcript.is_empty() {
        println!("Распознано: «{}»", outcome.transcript);
    }
    println!("{}", feedback_message(outcome.verdict.feedback));
    if outcome.step == Step::Retry {
        println!("Попыток: {}", outcome.attempts);
    }
}
