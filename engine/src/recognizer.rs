//! The seam to the speech recognizer backend.
//!
//! The engine never recognizes speech itself. A [`RecognizerProvider`] loads a
//! model and hands out [`Recognizer`]s that turn audio frames into a final
//! transcript with per-word confidence.

use serde::{Deserialize, Serialize};

use crate::audio_io::AudioFrame;
use crate::error::EngineError;
use crate::model_store::ModelSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordScore {
    pub word: String,
    pub confidence: f32,
    pub start_time: f32,
    pub end_time: f32,
}

/// Final transcript of one utterance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    pub words: Vec<WordScore>,
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    result: Vec<PayloadWord>,
}

#[derive(Deserialize)]
struct PayloadWord {
    word: String,
    conf: f32,
    start: f32,
    end: f32,
}

impl RecognitionResult {
    /// Parses a `{text, result: [{word, conf, start, end}]}` payload.
    pub fn from_payload(json: &str) -> Result<Self, EngineError> {
        let payload: Payload = serde_json::from_str(json)
            .map_err(|e| EngineError::ServiceUnavailable(format!("malformed result: {e}")))?;

        let words = payload
            .result
            .into_iter()
            .map(|w| {
                if w.start > w.end {
                    return Err(EngineError::InvalidArgument(format!(
                        "word '{}' ends before it starts ({} > {})",
                        w.word, w.start, w.end
                    )));
                }
                Ok(WordScore {
                    word: w.word.to_lowercase(),
                    confidence: w.conf.clamp(0.0, 1.0),
                    start_time: w.start,
                    end_time: w.end,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            text: payload.text.to_lowercase(),
            words,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.words.is_empty()
    }
}

/// Outcome of feeding one frame to a recognizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Running,
    Result(RecognitionResult),
    /// The recognizer closed the utterance without producing any words.
    EndOfUtterance,
}

pub trait Recognizer: Send + 'static {
    fn set_word_timings(&mut self, enabled: bool);

    fn accept_frame(&mut self, frame: &AudioFrame) -> Result<Decoded, EngineError>;

    /// Frees backend resources. Must be safe to call more than once.
    fn release(&mut self);
}

pub trait RecognizerProvider: Send + Sync + 'static {
    type Model: Send + Sync + 'static;
    type Recognizer: Recognizer;

    /// Blocking load. `progress` receives 0-100 as work advances.
    fn load_model(
        &self,
        source: &ModelSource,
        progress: &dyn Fn(u8),
    ) -> Result<Self::Model, EngineError>;

    fn create_recognizer(
        &self,
        model: &Self::Model,
        sample_rate: u32,
    ) -> Result<Self::Recognizer, EngineError>;
}
