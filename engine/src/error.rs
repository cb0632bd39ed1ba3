use thiserror::Error;

/// Coarse error classification consumers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unsupported,
    PermissionDenied,
    ServiceUnavailable,
    Aborted,
    NoSpeech,
    LoadFailure,
    InvalidArgument,
    Settings,
}

/// Unified engine errors.
///
/// Cloneable so a single model load outcome can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Speech recognition is not available on this platform")]
    Unsupported,

    #[error("Microphone access denied")]
    PermissionDenied,

    #[error("Recognizer service error: {0}")]
    ServiceUnavailable(String),

    #[error("Operation aborted")]
    Aborted,

    #[error("No speech detected")]
    NoSpeech,

    #[error("Model failed to load: {0}")]
    LoadFailure(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Settings: {0}")]
    Settings(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported => ErrorKind::Unsupported,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::Aborted => ErrorKind::Aborted,
            Self::NoSpeech => ErrorKind::NoSpeech,
            Self::LoadFailure(_) => ErrorKind::LoadFailure,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Settings(_) => ErrorKind::Settings,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unsupported => {
                "Speech recognition is not supported here. Build with a recognizer backend or use another device."
            }
            Self::PermissionDenied => {
                "Could not access the microphone. Please check that a microphone is connected and access is allowed."
            }
            Self::ServiceUnavailable(_) => {
                "The speech recognizer stopped working. Please try again."
            }
            Self::Aborted => "Speech recognition was aborted. Please try again.",
            Self::NoSpeech => "No speech detected. Please try speaking again.",
            Self::LoadFailure(_) => {
                "Could not load the speech model. Check your internet connection and try again."
            }
            Self::InvalidArgument(_) => "The request was not valid.",
            Self::Settings(_) => "Could not read or save your settings.",
        }
    }
}

impl serde::Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
