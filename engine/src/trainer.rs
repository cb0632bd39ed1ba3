//! Task sequencing and the learner-facing (Russian) wording.

use serde::Serialize;

use crate::difficulty::DifficultyProfile;
use crate::error::{EngineError, ErrorKind};
use crate::recognizer::RecognizerProvider;
use crate::scoring::{self, FeedbackKind, Verdict};
use crate::session::{RecognitionSession, SessionEvent};
use crate::tasks::SpeechTask;

pub const COMPLETION_TITLE: &str = "Поздравляем!";
pub const COMPLETION_TEXT: &str = "Вы успешно завершили все задания.";

pub fn feedback_message(kind: FeedbackKind) -> &'static str {
    match kind {
        FeedbackKind::None => "Правильно! Молодец!",
        FeedbackKind::WrongWord => "Неправильно. Попробуйте еще раз.",
        FeedbackKind::UnclearPronunciation => {
            "Слово верное, но произнесено нечетко. Попробуйте еще раз."
        }
    }
}

pub fn error_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Unsupported => "Распознавание речи недоступно на этом устройстве.",
        ErrorKind::PermissionDenied => {
            "Нет доступа к микрофону. Проверьте, что микрофон подключен и доступ разрешен."
        }
        ErrorKind::ServiceUnavailable => "Ошибка сервиса распознавания. Попробуйте еще раз.",
        ErrorKind::Aborted => "Распознавание прервано. Попробуйте еще раз.",
        ErrorKind::NoSpeech => "Речь не обнаружена. Попробуйте сказать еще раз.",
        ErrorKind::LoadFailure => "Не удалось загрузить модель распознавания речи.",
        ErrorKind::InvalidArgument => "Некорректные данные задания или уровень сложности.",
        ErrorKind::Settings => "Не удалось прочитать или сохранить настройки.",
    }
}

/// What a recorded verdict did to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    Retry,
    Advanced,
    Completed,
}

#[derive(Debug)]
pub struct Trainer {
    tasks: Vec<SpeechTask>,
    index: usize,
    attempts: u32,
    completed: bool,
}

impl Trainer {
    pub fn new(tasks: Vec<SpeechTask>) -> Result<Self, EngineError> {
        if tasks.is_empty() {
            return Err(EngineError::InvalidArgument("no tasks to practice".into()));
        }
        for task in &tasks {
            task.validate()?;
        }
        Ok(Self {
            tasks,
            index: 0,
            attempts: 0,
            completed: false,
        })
    }

    /// `None` once every task is done.
    pub fn current(&self) -> Option<&SpeechTask> {
        if self.completed {
            None
        } else {
            self.tasks.get(self.index)
        }
    }

    /// 1-based position of the current task.
    pub fn position(&self) -> usize {
        self.index + 1
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn progress_percent(&self) -> u8 {
        if self.completed {
            return 100;
        }
        (self.position() * 100 / self.tasks.len()) as u8
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn record(&mut self, verdict: &Verdict) -> Step {
        if self.completed {
            return Step::Completed;
        }
        self.attempts += 1;
        if !verdict.is_correct {
            return Step::Retry;
        }

        if self.index + 1 < self.tasks.len() {
            self.index += 1;
            self.attempts = 0;
            Step::Advanced
        } else {
            self.completed = true;
            log::info!("All {} tasks completed", self.tasks.len());
            Step::Completed
        }
    }

    pub fn restart(&mut self) {
        self.index = 0;
        self.attempts = 0;
        self.completed = false;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptOutcome {
    pub task_id: u32,
    pub transcript: String,
    pub verdict: Verdict,
    /// Attempts spent on the task, this one included.
    pub attempts: u32,
    pub step: Step,
}

/// Listens once for the current task and grades what was heard.
pub async fn run_attempt<P: RecognizerProvider>(
    trainer: &mut Trainer,
    session: &RecognitionSession<P>,
    profile: &DifficultyProfile,
) -> Result<AttemptOutcome, EngineError> {
    let task = trainer
        .current()
        .cloned()
        .ok_or_else(|| EngineError::InvalidArgument("all tasks are completed".into()))?;

    session.start().await?;
    let result = match session.next_event().await {
        Some(SessionEvent::Result(result)) => result,
        Some(SessionEvent::Error(err)) => return Err(err),
        None => return Err(EngineError::Aborted),
    };

    let verdict = scoring::evaluate(&result, &task.expected_word, profile);
    log::info!(
        "Task {}: heard \"{}\", similarity {:.2}, correct={}",
        task.id,
        result.text,
        verdict.similarity,
        verdict.is_correct
    );

    let attempts = trainer.attempts() + 1;
    let step = trainer.record(&verdict);

    Ok(AttemptOutcome {
        task_id: task.id,
        transcript: result.text,
        verdict,
        attempts,
        step,
    })
}
