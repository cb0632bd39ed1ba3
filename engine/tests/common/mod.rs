#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use speech_trainer_lib::audio_io::AudioFrame;
use speech_trainer_lib::{
    CaptureConfig, Decoded, EngineError, MediaStream, MicrophoneSource, ModelManager, ModelSource,
    RecognitionResult, Recognizer, RecognizerProvider, RecordingError, WordScore,
};

pub type Script = Vec<Result<Decoded, EngineError>>;

#[derive(Default)]
pub struct Stats {
    pub loads: AtomicUsize,
    /// `create_recognizer` calls, counted before any gate.
    pub create_calls: AtomicUsize,
    pub recognizers_created: AtomicUsize,
    pub recognizers_released: AtomicUsize,
    pub frames_accepted: AtomicUsize,
    pub streams_opened: AtomicUsize,
    pub streams_stopped: AtomicUsize,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        Self::get(&self.streams_opened) - Self::get(&self.streams_stopped)
    }

    pub fn live_recognizers(&self) -> usize {
        Self::get(&self.recognizers_created) - Self::get(&self.recognizers_released)
    }
}

/// Blocks model loads until opened.
#[derive(Default)]
pub struct LoadGate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl LoadGate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

#[derive(Debug)]
pub struct FakeModel {
    pub serial: usize,
}

pub struct FakeProvider {
    pub stats: Arc<Stats>,
    pub gate: Option<Arc<LoadGate>>,
    pub failing_loads: AtomicUsize,
    pub fail_create: bool,
    pub progress_steps: Vec<u8>,
    create_gate: Option<(usize, Arc<LoadGate>)>,
    scripts: Mutex<VecDeque<Script>>,
}

impl FakeProvider {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self {
            stats,
            gate: None,
            failing_loads: AtomicUsize::new(0),
            fail_create: false,
            progress_steps: Vec::new(),
            create_gate: None,
            scripts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn gated(mut self, gate: Arc<LoadGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Blocks the `call`-th `create_recognizer` (1-based) until `gate` opens.
    pub fn gated_create(mut self, call: usize, gate: Arc<LoadGate>) -> Self {
        self.create_gate = Some((call, gate));
        self
    }

    pub fn failing(self, loads: usize) -> Self {
        self.failing_loads.store(loads, Ordering::SeqCst);
        self
    }

    pub fn with_progress(mut self, steps: &[u8]) -> Self {
        self.progress_steps = steps.to_vec();
        self
    }

    /// Each created recognizer plays the next script, then keeps returning `Running`.
    pub fn with_scripts(self, scripts: Vec<Script>) -> Self {
        *self.scripts.lock().unwrap() = scripts.into();
        self
    }
}

impl RecognizerProvider for FakeProvider {
    type Model = FakeModel;
    type Recognizer = FakeRecognizer;

    fn load_model(
        &self,
        _source: &ModelSource,
        progress: &dyn Fn(u8),
    ) -> Result<Self::Model, EngineError> {
        let serial = self.stats.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        for step in &self.progress_steps {
            progress(*step);
        }

        let failing = self.failing_loads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_loads.store(failing - 1, Ordering::SeqCst);
            return Err(EngineError::LoadFailure("model archive is corrupt".into()));
        }
        Ok(FakeModel { serial })
    }

    fn create_recognizer(
        &self,
        _model: &Self::Model,
        sample_rate: u32,
    ) -> Result<Self::Recognizer, EngineError> {
        assert_eq!(sample_rate, 16_000);
        let call = self.stats.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((gated, gate)) = &self.create_gate {
            if *gated == call {
                gate.wait();
            }
        }
        if self.fail_create {
            return Err(EngineError::ServiceUnavailable("recognizer unavailable".into()));
        }
        self.stats.recognizers_created.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(FakeRecognizer {
            script: script.into(),
            word_timings: false,
            released: false,
            stats: Arc::clone(&self.stats),
        })
    }
}

pub struct FakeRecognizer {
    script: VecDeque<Result<Decoded, EngineError>>,
    word_timings: bool,
    released: bool,
    stats: Arc<Stats>,
}

impl Recognizer for FakeRecognizer {
    fn set_word_timings(&mut self, enabled: bool) {
        self.word_timings = enabled;
    }

    fn accept_frame(&mut self, frame: &AudioFrame) -> Result<Decoded, EngineError> {
        assert!(self.word_timings, "word timings must be enabled before audio");
        assert!(!frame.is_empty());
        if self.released {
            return Err(EngineError::Aborted);
        }
        self.stats.frames_accepted.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or(Ok(Decoded::Running))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.recognizers_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct FakeMicrophone {
    pub stats: Arc<Stats>,
    /// `None` streams until stopped.
    pub frames: Option<usize>,
    pub interval: Duration,
    pub failure: Option<RecordingError>,
}

impl FakeMicrophone {
    pub fn endless(stats: Arc<Stats>) -> Self {
        Self {
            stats,
            frames: None,
            interval: Duration::from_millis(2),
            failure: None,
        }
    }

    pub fn finite(stats: Arc<Stats>, frames: usize) -> Self {
        Self {
            frames: Some(frames),
            ..Self::endless(stats)
        }
    }

    pub fn failing(stats: Arc<Stats>, failure: RecordingError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::endless(stats)
        }
    }
}

#[async_trait]
impl MicrophoneSource for FakeMicrophone {
    async fn request_stream(
        &self,
        config: CaptureConfig,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn MediaStream>, RecordingError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.channels, 1);

        self.stats.streams_opened.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let limit = self.frames;
        let interval = self.interval;
        let frame_size = config.frame_size;

        tokio::spawn(async move {
            let mut sent = 0usize;
            while limit.map_or(true, |limit| sent < limit) {
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                let frame = AudioFrame::new(vec![0.01; frame_size]);
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    sent_ok = frames.send(frame) => if sent_ok.is_err() { return },
                }
                sent += 1;
            }
        });

        Ok(Box::new(FakeStream {
            cancel,
            stopped: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct FakeStream {
    cancel: CancellationToken,
    stopped: bool,
    stats: Arc<Stats>,
}

impl MediaStream for FakeStream {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.cancel.cancel();
            self.stats.streams_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped
    }
}

pub fn source() -> ModelSource {
    ModelSource::Directory("/models/fake".into())
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn manager(provider: FakeProvider) -> ModelManager<FakeProvider> {
    init_logging();
    ModelManager::new(provider, source())
}

pub fn heard(text: &str, confidence: f32) -> Decoded {
    Decoded::Result(RecognitionResult {
        text: text.to_string(),
        words: text
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| WordScore {
                word: word.to_string(),
                confidence,
                start_time: i as f32 * 0.4,
                end_time: i as f32 * 0.4 + 0.3,
            })
            .collect(),
    })
}

/// Polls `condition` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
