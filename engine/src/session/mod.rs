//! One listening attempt at a time: model, audio pipeline, recognizer.
//!
//! [`RecognitionSession::start`] acquires, in order, the model, an audio
//! context with its frame queue, a microphone stream, a recognizer with word
//! timings enabled, and the bridge task that forwards frames. Every exit path
//! (result, error, `stop`, a superseding `start`, dropping the session) goes
//! through the same reverse-order release.
//!
//! Outcomes are delivered as [`SessionEvent`]s through
//! [`RecognitionSession::next_event`]. Each event is tagged with the attempt
//! that produced it; events from an attempt that was stopped or replaced are
//! never handed out.

mod bridge;
mod resources;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio_io::{TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::error::EngineError;
use crate::model::ModelManager;
use crate::recognizer::{RecognitionResult, Recognizer, RecognizerProvider};
use crate::recording::{CaptureConfig, MicrophoneSource};

use bridge::BridgeParts;
use resources::{AudioContext, SessionResources};

pub const DEFAULT_FRAME_SIZE: usize = 4096;
pub const DEFAULT_FRAME_QUEUE: usize = 8;
pub const DEFAULT_RESTART_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size: usize,
    /// Frames that may wait between capture and the recognizer.
    pub frame_queue: usize,
    pub restart_debounce: Duration,
    /// Local guard: give up with `NoSpeech` if nothing is recognized in time.
    pub listen_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: TARGET_CHANNELS,
            frame_size: DEFAULT_FRAME_SIZE,
            frame_queue: DEFAULT_FRAME_QUEUE,
            restart_debounce: DEFAULT_RESTART_DEBOUNCE,
            listen_timeout: None,
        }
    }
}

impl SessionConfig {
    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frame_size: self.frame_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Listening,
    Finalizing,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Result(RecognitionResult),
    Error(EngineError),
}

struct TaggedEvent {
    generation: u64,
    event: SessionEvent,
}

struct Control<R: Recognizer> {
    state: SessionState,
    /// Identifies the current attempt; bumped by `start` and `stop`.
    generation: u64,
    resources: Option<SessionResources<R>>,
    last_error: Option<EngineError>,
}

pub(crate) struct SessionInner<P: RecognizerProvider> {
    manager: ModelManager<P>,
    microphone: Arc<dyn MicrophoneSource>,
    config: SessionConfig,
    control: Mutex<Control<P::Recognizer>>,
    /// Serializes acquisition so two attempts never hold devices at once.
    start_gate: tokio::sync::Mutex<()>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TaggedEvent>>,
}

impl<P: RecognizerProvider> SessionInner<P> {
    fn lock(&self) -> MutexGuard<'_, Control<P::Recognizer>> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    pub(crate) fn is_listening(&self, generation: u64) -> bool {
        let ctl = self.lock();
        ctl.generation == generation && ctl.state == SessionState::Listening
    }

    fn emit(&self, generation: u64, event: SessionEvent) {
        let _ = self.events_tx.send(TaggedEvent { generation, event });
    }

    /// Listening → Finalizing → Idle, emitting `result` before the release.
    pub(crate) fn finish(&self, generation: u64, result: RecognitionResult) {
        let resources = {
            let mut ctl = self.lock();
            if ctl.generation != generation || ctl.state != SessionState::Listening {
                return;
            }
            ctl.state = SessionState::Finalizing;
            log::info!("Recognized \"{}\" ({} words)", result.text, result.words.len());
            self.emit(generation, SessionEvent::Result(result));
            ctl.resources.take()
        };

        drop(resources);

        let mut ctl = self.lock();
        if ctl.generation == generation && ctl.state == SessionState::Finalizing {
            ctl.state = SessionState::Idle;
        }
    }

    /// Listening → Error; resources are released before the error is emitted.
    pub(crate) fn fail(&self, generation: u64, err: EngineError) {
        let resources = {
            let mut ctl = self.lock();
            if ctl.generation != generation || ctl.state != SessionState::Listening {
                return;
            }
            ctl.state = SessionState::Error;
            ctl.last_error = Some(err.clone());
            ctl.resources.take()
        };

        log::warn!("Listening attempt failed: {err}");
        drop(resources);

        let ctl = self.lock();
        if ctl.generation == generation {
            self.emit(generation, SessionEvent::Error(err));
        }
    }
}

/// Handle to a recognition session; clones share the same session.
pub struct RecognitionSession<P: RecognizerProvider> {
    inner: Arc<SessionInner<P>>,
}

impl<P: RecognizerProvider> Clone for RecognitionSession<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: RecognizerProvider> RecognitionSession<P> {
    pub fn new(
        manager: ModelManager<P>,
        microphone: Arc<dyn MicrophoneSource>,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(SessionInner {
                manager,
                microphone,
                config,
                control: Mutex::new(Control {
                    state: SessionState::Idle,
                    generation: 0,
                    resources: None,
                    last_error: None,
                }),
                start_gate: tokio::sync::Mutex::new(()),
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The error that moved the session into `Error`, cleared by `start`/`stop`.
    pub fn last_error(&self) -> Option<EngineError> {
        self.inner.lock().last_error.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Begins a new listening attempt, tearing down any previous one first.
    ///
    /// Resolves once every resource is acquired and frames are flowing. If a
    /// `stop` or another `start` supersedes this call while it is acquiring,
    /// it releases what it holds and returns [`EngineError::Aborted`].
    pub async fn start(&self) -> Result<(), EngineError> {
        let (generation, previous) = {
            let mut ctl = self.inner.lock();
            ctl.generation += 1;
            ctl.state = SessionState::Idle;
            ctl.last_error = None;
            (ctl.generation, ctl.resources.take())
        };
        if previous.is_some() {
            log::info!("Restarting session; releasing the previous attempt");
        }
        drop(previous);

        let _gate = self.inner.start_gate.lock().await;
        if !self.inner.is_current(generation) {
            return Err(EngineError::Aborted);
        }

        match self.acquire(generation).await {
            Ok(mut resources) => {
                let mut ctl = self.inner.lock();
                if ctl.generation != generation {
                    drop(ctl);
                    drop(resources);
                    return Err(EngineError::Aborted);
                }
                if let Some(bridge) = resources.bridge.as_mut() {
                    bridge.arm();
                }
                ctl.resources = Some(resources);
                ctl.state = SessionState::Listening;
                log::info!("Session listening");
                Ok(())
            }
            Err(err) => {
                let mut ctl = self.inner.lock();
                if ctl.generation != generation {
                    return Err(EngineError::Aborted);
                }
                ctl.state = SessionState::Error;
                ctl.last_error = Some(err.clone());
                log::warn!("Session failed to start: {err}");
                Err(err)
            }
        }
    }

    async fn acquire(
        &self,
        generation: u64,
    ) -> Result<SessionResources<P::Recognizer>, EngineError> {
        let inner = &self.inner;
        let config = &inner.config;

        let model = inner.manager.request_model().await?;
        if !inner.is_current(generation) {
            return Err(EngineError::Aborted);
        }

        let mut resources = SessionResources::new();

        let (context, frames_tx) = AudioContext::open(config);
        resources.context = Some(context);

        let stream = inner
            .microphone
            .request_stream(config.capture(), frames_tx)
            .await?;
        resources.stream = Some(stream);
        if !inner.is_current(generation) {
            return Err(EngineError::Aborted);
        }

        let mut recognizer = inner
            .manager
            .provider()
            .create_recognizer(&model, config.sample_rate)?;
        recognizer.set_word_timings(true);
        let recognizer = Arc::new(Mutex::new(recognizer));
        resources.recognizer = Some(Arc::clone(&recognizer));

        let frames = resources
            .context
            .as_mut()
            .and_then(AudioContext::take_frames)
            .ok_or_else(|| EngineError::ServiceUnavailable("audio context closed".into()))?;

        resources.bridge = Some(bridge::spawn(BridgeParts {
            session: Arc::downgrade(inner),
            generation,
            model,
            recognizer,
            frames,
        }));

        Ok(resources)
    }

    /// Ends the current attempt from any state. Idempotent.
    pub fn stop(&self) {
        let resources = {
            let mut ctl = self.inner.lock();
            ctl.generation += 1;
            ctl.state = SessionState::Idle;
            ctl.last_error = None;
            ctl.resources.take()
        };
        if resources.is_some() {
            log::info!("Session stopped");
        }
        drop(resources);
    }

    /// Waits for the next outcome of the current attempt.
    ///
    /// Stale events from stopped or replaced attempts are skipped.
    pub async fn next_event(&self) -> Option<SessionEvent> {
        let mut events = self.inner.events_rx.lock().await;
        loop {
            let tagged = events.recv().await?;
            if self.inner.is_current(tagged.generation) {
                return Some(tagged.event);
            }
            log::debug!("Dropping event from a finished attempt");
        }
    }
}
