//! Microphone capture.
//!
//! A [`MicrophoneSource`] opens a [`MediaStream`] that pushes fixed-size
//! 16 kHz mono frames into the bounded channel it is given. [`CpalMicrophone`]
//! is the default-input-device implementation.

mod audio_thread;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc as frame_mpsc;

use crate::audio_io::{AudioFrame, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::error::EngineError;

const DEVICE_INIT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordingError {
    #[error("No default input device available")]
    NoInputDevice,
    #[error("Input device refused to open: {0}")]
    DeviceUnavailable(String),
    #[error("Unsupported sample format")]
    UnsupportedFormat,
    #[error("Device error: {0}")]
    Device(String),
    #[error("Audio thread panicked or failed to start")]
    ThreadError,
}

impl RecordingError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoInputDevice => "No microphone found. Please check your audio settings.",
            Self::DeviceUnavailable(_) => {
                "The microphone could not be opened. Check that access is allowed."
            }
            Self::UnsupportedFormat => "Your microphone's audio format is not supported.",
            Self::Device(_) => "A microphone error occurred. Please check your audio settings.",
            Self::ThreadError => "Internal audio error. Please restart the app.",
        }
    }
}

impl From<RecordingError> for EngineError {
    fn from(err: RecordingError) -> Self {
        match err {
            RecordingError::NoInputDevice | RecordingError::DeviceUnavailable(_) => {
                EngineError::PermissionDenied
            }
            RecordingError::UnsupportedFormat => EngineError::Unsupported,
            RecordingError::Device(msg) => EngineError::ServiceUnavailable(msg),
            RecordingError::ThreadError => {
                EngineError::ServiceUnavailable("audio thread failed".to_string())
            }
        }
    }
}

/// Requested capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per delivered frame.
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: TARGET_CHANNELS,
            frame_size: 4096,
        }
    }
}

/// A live capture. Stopping ends frame delivery; stopping twice is a no-op.
pub trait MediaStream: Send {
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

#[async_trait]
pub trait MicrophoneSource: Send + Sync + 'static {
    /// Opens a stream that sends frames into `frames` until stopped.
    async fn request_stream(
        &self,
        config: CaptureConfig,
        frames: frame_mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn MediaStream>, RecordingError>;
}

pub(super) enum AudioCmd {
    Stop,
}

/// Default input device through cpal, captured on a dedicated thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MicrophoneSource for CpalMicrophone {
    async fn request_stream(
        &self,
        config: CaptureConfig,
        frames: frame_mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn MediaStream>, RecordingError> {
        let stream = tokio::task::spawn_blocking(move || CpalStream::open(config, frames))
            .await
            .map_err(|_| RecordingError::ThreadError)??;
        Ok(Box::new(stream))
    }
}

pub struct CpalStream {
    cmd_tx: Option<mpsc::Sender<AudioCmd>>,
    worker_handle: Option<thread::JoinHandle<()>>,
    overrun_count: Arc<AtomicUsize>,
}

impl CpalStream {
    fn open(
        config: CaptureConfig,
        frames: frame_mpsc::Sender<AudioFrame>,
    ) -> Result<Self, RecordingError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();
        let overrun_count = Arc::new(AtomicUsize::new(0));

        let overrun_clone = Arc::clone(&overrun_count);
        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                if let Err(e) = audio_thread::init_and_run_audio_thread(
                    config,
                    cmd_rx,
                    init_tx,
                    frames,
                    overrun_clone,
                ) {
                    log::error!("Audio thread failed: {e}");
                }
            })
            .map_err(|_| RecordingError::ThreadError)?;

        match init_rx.recv_timeout(DEVICE_INIT_TIMEOUT) {
            Ok(Ok(())) => {
                log::info!("Microphone stream started");
                Ok(Self {
                    cmd_tx: Some(cmd_tx),
                    worker_handle: Some(handle),
                    overrun_count,
                })
            }
            res => {
                drop(cmd_tx);
                let _ = handle.join();
                match res {
                    Ok(Err(e)) => Err(e),
                    _ => Err(RecordingError::ThreadError),
                }
            }
        }
    }

    pub fn overruns(&self) -> usize {
        self.overrun_count.load(Ordering::Relaxed)
    }
}

impl MediaStream for CpalStream {
    fn stop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(AudioCmd::Stop);
        }
        if let Some(handle) = self.worker_handle.take() {
            join_audio_thread(handle, Arc::clone(&self.overrun_count));
        }
    }

    fn is_live(&self) -> bool {
        self.worker_handle.is_some()
    }
}

/// Waits for the capture thread to drain and exit.
///
/// Inside a tokio runtime the join moves to the blocking pool so the calling
/// worker is not held while the device shuts down.
fn join_audio_thread(handle: thread::JoinHandle<()>, overrun_count: Arc<AtomicUsize>) {
    let join = move || {
        if handle.join().is_err() {
            log::warn!("Audio thread panicked during shutdown");
        }
        log::info!(
            "Microphone stream stopped ({} dropped samples)",
            overrun_count.load(Ordering::Relaxed)
        );
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(join);
        }
        Err(_) => join(),
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}
