//! The task that feeds captured frames to the recognizer.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audio_io::AudioFrame;
use crate::error::EngineError;
use crate::model::ModelHandle;
use crate::recognizer::{Decoded, Recognizer, RecognizerProvider};

use super::resources::{lock_recognizer, SharedRecognizer};
use super::SessionInner;

pub(crate) struct BridgeHandle {
    cancel: CancellationToken,
    arm: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Lets the bridge start forwarding frames.
    pub(crate) fn arm(&mut self) {
        if let Some(tx) = self.arm.take() {
            let _ = tx.send(());
        }
    }

    /// Cancels the task; it exits at its next wake-up without touching the session.
    pub(crate) fn shutdown(&mut self) {
        self.cancel.cancel();
        self.arm.take();
        self.task.take();
    }
}

pub(crate) struct BridgeParts<P: RecognizerProvider> {
    pub(crate) session: Weak<SessionInner<P>>,
    pub(crate) generation: u64,
    pub(crate) model: ModelHandle<P::Model>,
    pub(crate) recognizer: SharedRecognizer<P::Recognizer>,
    pub(crate) frames: mpsc::Receiver<AudioFrame>,
}

pub(crate) fn spawn<P: RecognizerProvider>(parts: BridgeParts<P>) -> BridgeHandle {
    let cancel = CancellationToken::new();
    let (arm_tx, arm_rx) = oneshot::channel();
    let task = tokio::spawn(run(parts, cancel.clone(), arm_rx));

    BridgeHandle {
        cancel,
        arm: Some(arm_tx),
        task: Some(task),
    }
}

enum Restart {
    Resumed,
    Stopped,
    Failed(EngineError),
}

async fn run<P: RecognizerProvider>(
    parts: BridgeParts<P>,
    cancel: CancellationToken,
    armed: oneshot::Receiver<()>,
) {
    let BridgeParts {
        session,
        generation,
        model,
        recognizer,
        mut frames,
    } = parts;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        armed = armed => if armed.is_err() { return },
    }

    let Some((listen_timeout, debounce)) = session
        .upgrade()
        .map(|s| (s.config.listen_timeout, s.config.restart_debounce))
    else {
        return;
    };
    let deadline = listen_timeout.map(|timeout| Instant::now() + timeout);
    let mut restarted = false;
    let mut forwarded = 0usize;

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = sleep_until(deadline) => {
                log::info!("No result within the listening window");
                fail(&session, generation, EngineError::NoSpeech);
                return;
            }
            frame = frames.recv() => frame,
        };

        let Some(frame) = frame else {
            log::info!("Microphone stream ended after {forwarded} frames without a result");
            fail(&session, generation, EngineError::NoSpeech);
            return;
        };

        if cancel.is_cancelled() {
            return;
        }
        forwarded += 1;
        let decoded = lock_recognizer(&recognizer).accept_frame(&frame);

        match decoded {
            Ok(Decoded::Running) => {}
            Ok(Decoded::Result(result)) => {
                log::debug!("Recognizer produced a result after {forwarded} frames");
                if let Some(s) = session.upgrade() {
                    s.finish(generation, result);
                }
                return;
            }
            Ok(Decoded::EndOfUtterance) if restarted => {
                log::info!("Second end of utterance in one attempt; giving up");
                fail(&session, generation, EngineError::NoSpeech);
                return;
            }
            Ok(Decoded::EndOfUtterance) => {
                restarted = true;
                let outcome = restart(
                    &session,
                    generation,
                    &model,
                    &recognizer,
                    &mut frames,
                    &cancel,
                    debounce,
                )
                .await;
                match outcome {
                    Restart::Resumed => {}
                    Restart::Stopped => return,
                    Restart::Failed(err) => {
                        fail(&session, generation, err);
                        return;
                    }
                }
            }
            Err(err) => {
                log::warn!("Recognizer rejected a frame: {err}");
                fail(&session, generation, err);
                return;
            }
        }
    }
}

/// Re-creates the recognizer after a debounce, if the attempt is still live.
async fn restart<P: RecognizerProvider>(
    session: &Weak<SessionInner<P>>,
    generation: u64,
    model: &ModelHandle<P::Model>,
    recognizer: &SharedRecognizer<P::Recognizer>,
    frames: &mut mpsc::Receiver<AudioFrame>,
    cancel: &CancellationToken,
    debounce: Duration,
) -> Restart {
    if !is_listening(session, generation) {
        return Restart::Stopped;
    }
    log::info!("End of utterance before a result; restarting recognizer in {debounce:?}");
    lock_recognizer(recognizer).release();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Restart::Stopped,
        _ = tokio::time::sleep(debounce) => {}
    }

    let Some(s) = session.upgrade() else {
        return Restart::Stopped;
    };
    if cancel.is_cancelled() || !s.is_listening(generation) {
        return Restart::Stopped;
    }

    let mut fresh = match s
        .manager
        .provider()
        .create_recognizer(model, s.config.sample_rate)
    {
        Ok(fresh) => fresh,
        Err(err) => return Restart::Failed(err),
    };
    fresh.set_word_timings(true);

    let mut dropped = 0usize;
    while frames.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        log::debug!("Discarded {dropped} frames captured during the restart delay");
    }

    // `release()` cancels before it takes this lock, so checking under the
    // lock decides who releases `fresh`.
    let mut slot = lock_recognizer(recognizer);
    if cancel.is_cancelled() {
        fresh.release();
        return Restart::Stopped;
    }
    *slot = fresh;
    Restart::Resumed
}

fn is_listening<P: RecognizerProvider>(session: &Weak<SessionInner<P>>, generation: u64) -> bool {
    session
        .upgrade()
        .is_some_and(|s| s.is_listening(generation))
}

fn fail<P: RecognizerProvider>(session: &Weak<SessionInner<P>>, generation: u64, err: EngineError) {
    if let Some(s) = session.upgrade() {
        s.fail(generation, err);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

