use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::audio_io::AudioFrame;
use crate::recognizer::Recognizer;
use crate::recording::MediaStream;

use super::bridge::BridgeHandle;
use super::SessionConfig;

pub(crate) type SharedRecognizer<R> = Arc<Mutex<R>>;

pub(crate) fn lock_recognizer<R>(recognizer: &SharedRecognizer<R>) -> MutexGuard<'_, R> {
    recognizer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Capture format plus the bounded frame queue between microphone and recognizer.
pub(crate) struct AudioContext {
    sample_rate: u32,
    channels: u16,
    frames: Option<mpsc::Receiver<AudioFrame>>,
}

impl AudioContext {
    pub(crate) fn open(config: &SessionConfig) -> (Self, mpsc::Sender<AudioFrame>) {
        let (tx, rx) = mpsc::channel(config.frame_queue.max(1));
        log::debug!(
            "Audio context opened: {} Hz, {} channel(s)",
            config.sample_rate,
            config.channels
        );
        (
            Self {
                sample_rate: config.sample_rate,
                channels: config.channels,
                frames: Some(rx),
            },
            tx,
        )
    }

    pub(crate) fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames.take()
    }

    fn close(&mut self) {
        self.frames = None;
        log::debug!(
            "Audio context closed ({} Hz, {} channel(s))",
            self.sample_rate,
            self.channels
        );
    }
}

/// Everything one listening attempt owns.
///
/// Fields are filled in acquisition order and released in reverse. Dropping
/// the set releases whatever was acquired, so a failed `start` cannot leak.
pub(crate) struct SessionResources<R: Recognizer> {
    pub(crate) context: Option<AudioContext>,
    pub(crate) stream: Option<Box<dyn MediaStream>>,
    pub(crate) recognizer: Option<SharedRecognizer<R>>,
    pub(crate) bridge: Option<BridgeHandle>,
}

impl<R: Recognizer> SessionResources<R> {
    pub(crate) fn new() -> Self {
        Self {
            context: None,
            stream: None,
            recognizer: None,
            bridge: None,
        }
    }

    /// Idempotent.
    pub(crate) fn release(&mut self) {
        if let Some(mut bridge) = self.bridge.take() {
            bridge.shutdown();
        }
        if let Some(recognizer) = self.recognizer.take() {
            lock_recognizer(&recognizer).release();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        if let Some(mut context) = self.context.take() {
            context.close();
        }
    }
}

impl<R: Recognizer> Drop for SessionResources<R> {
    fn drop(&mut self) {
        self.release();
    }
}
