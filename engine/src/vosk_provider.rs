//! Vosk-backed recognizer provider (needs the native libvosk at link time).

use serde_json::json;
use vosk::{CompleteResult, DecodingState};

use crate::audio_io::AudioFrame;
use crate::error::EngineError;
use crate::model_store::{resolve_model_dir, ModelSource};
use crate::recognizer::{Decoded, RecognitionResult, Recognizer, RecognizerProvider};

#[derive(Debug, Default, Clone, Copy)]
pub struct VoskProvider;

impl RecognizerProvider for VoskProvider {
    type Model = vosk::Model;
    type Recognizer = VoskRecognizer;

    fn load_model(
        &self,
        source: &ModelSource,
        progress: &dyn Fn(u8),
    ) -> Result<Self::Model, EngineError> {
        let dir = resolve_model_dir(source, progress)?;
        log::info!("Initializing Vosk model from {}", dir.display());

        vosk::Model::new(dir.to_string_lossy()).ok_or_else(|| {
            EngineError::LoadFailure(format!("Vosk rejected model at {}", dir.display()))
        })
    }

    fn create_recognizer(
        &self,
        model: &Self::Model,
        sample_rate: u32,
    ) -> Result<Self::Recognizer, EngineError> {
        let recognizer = vosk::Recognizer::new(model, sample_rate as f32).ok_or_else(|| {
            EngineError::ServiceUnavailable("Vosk could not create a recognizer".into())
        })?;
        Ok(VoskRecognizer {
            inner: Some(recognizer),
        })
    }
}

pub struct VoskRecognizer {
    inner: Option<vosk::Recognizer>,
}

impl VoskRecognizer {
    fn finalized(recognizer: &mut vosk::Recognizer) -> Result<Decoded, EngineError> {
        let single = match recognizer.result() {
            CompleteResult::Single(single) => single,
            CompleteResult::Multiple(_) => {
                return Err(EngineError::ServiceUnavailable(
                    "unexpected alternatives in Vosk result".into(),
                ))
            }
        };

        if single.text.trim().is_empty() {
            return Ok(Decoded::EndOfUtterance);
        }

        let payload = json!({
            "text": single.text,
            "result": single.result.iter().map(|w| json!({
                "word": w.word,
                "conf": w.conf,
                "start": w.start,
                "end": w.end,
            })).collect::<Vec<_>>(),
        });
        RecognitionResult::from_payload(&payload.to_string()).map(Decoded::Result)
    }
}

impl Recognizer for VoskRecognizer {
    fn set_word_timings(&mut self, enabled: bool) {
        if let Some(recognizer) = self.inner.as_mut() {
            recognizer.set_words(enabled);
        }
    }

    fn accept_frame(&mut self, frame: &AudioFrame) -> Result<Decoded, EngineError> {
        let Some(recognizer) = self.inner.as_mut() else {
            return Err(EngineError::Aborted);
        };

        match recognizer.accept_waveform(&frame.to_pcm16()) {
            Ok(DecodingState::Finalized) => Self::finalized(recognizer),
            Ok(DecodingState::Running) => Ok(Decoded::Running),
            Ok(DecodingState::Failed) => Err(EngineError::ServiceUnavailable(
                "Vosk failed to decode audio".into(),
            )),
            Err(e) => Err(EngineError::ServiceUnavailable(format!(
                "Vosk rejected audio: {e:?}"
            ))),
        }
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            log::debug!("Vosk recognizer released");
        }
    }
}
