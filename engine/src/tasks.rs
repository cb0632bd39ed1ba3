use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One picture-and-word exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechTask {
    pub id: u32,
    pub prompt: String,
    pub expected_word: String,
    /// Image path shown next to the prompt.
    pub image: String,
}

impl SpeechTask {
    pub fn new(id: u32, prompt: &str, expected_word: &str, image: &str) -> Self {
        Self {
            id,
            prompt: prompt.to_string(),
            expected_word: expected_word.to_string(),
            image: image.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.prompt.trim().is_empty() {
            return Err(EngineError::InvalidArgument(format!(
                "task {} has an empty prompt",
                self.id
            )));
        }
        if self.expected_word.trim().is_empty() {
            return Err(EngineError::InvalidArgument(format!(
                "task {} has an empty expected word",
                self.id
            )));
        }
        Ok(())
    }
}

pub fn builtin_tasks() -> Vec<SpeechTask> {
    vec![
        SpeechTask::new(1, "скажи котик", "котик", "/images/cat.jpg"),
        SpeechTask::new(2, "скажи папа", "папа", "/images/father.jpg"),
        SpeechTask::new(3, "скажи ёжик", "ёжик", "/images/hedgehog.jpg"),
        SpeechTask::new(4, "скажи мама", "мама", "/images/mother.jpg"),
        SpeechTask::new(5, "скажи дерево", "дерево", "/images/tree.jpg"),
        SpeechTask::new(6, "скажи зебра", "зебра", "/images/zebra.jpg"),
        SpeechTask::new(7, "скажи вертолёт", "вертолёт", "/images/helicopter.jpg"),
    ]
}

/// Parses a JSON array of tasks and validates every entry.
pub fn parse_tasks(json: &str) -> Result<Vec<SpeechTask>, EngineError> {
    let tasks: Vec<SpeechTask> = serde_json::from_str(json)
        .map_err(|e| EngineError::InvalidArgument(format!("malformed task list: {e}")))?;
    if tasks.is_empty() {
        return Err(EngineError::InvalidArgument("task list is empty".into()));
    }
    for task in &tasks {
        task.validate()?;
    }
    Ok(tasks)
}
