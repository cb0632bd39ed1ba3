//! Pronunciation verification engine.
//!
//! The engine drives an external speech recognizer: it owns the model
//! lifecycle ([`model`]), runs one listening attempt at a time against the
//! microphone ([`session`]) and grades the transcript ([`scoring`]) against
//! the selected [`difficulty`] profile.

pub mod audio_io;
pub mod difficulty;
pub mod error;
pub mod model;
pub mod model_store;
pub mod recognizer;
pub mod recording;
pub mod scoring;
pub mod session;
pub mod settings;
pub mod tasks;
pub mod trainer;
#[cfg(feature = "vosk")]
pub mod vosk_provider;

pub use difficulty::{DifficultyLevel, DifficultyProfile, DifficultyStore};
pub use error::{EngineError, ErrorKind};
pub use model::{LoadState, ModelHandle, ModelManager, ModelStatus, Subscription};
pub use model_store::ModelSource;
pub use recognizer::{Decoded, RecognitionResult, Recognizer, RecognizerProvider, WordScore};
pub use recording::{CaptureConfig, CpalMicrophone, MediaStream, MicrophoneSource, RecordingError};
pub use scoring::{evaluate, FeedbackKind, Verdict};
pub use session::{RecognitionSession, SessionConfig, SessionEvent, SessionState};
pub use tasks::SpeechTask;
pub use trainer::Trainer;
