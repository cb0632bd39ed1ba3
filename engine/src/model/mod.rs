//! Process-wide owner of the recognition model.
//!
//! A [`ModelManager`] is built once by the application entry point and handed
//! to every session. Concurrent `request_model` calls share one load; status
//! and progress are broadcast to subscribers.

mod subscribers;

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::model_store::ModelSource;
use crate::recognizer::RecognizerProvider;

use subscribers::Subscribers;
pub use subscribers::Subscription;

/// Shared read-only handle to a loaded model.
pub struct ModelHandle<M>(Arc<M>);

impl<M> ModelHandle<M> {
    fn new(model: M) -> Self {
        Self(Arc::new(model))
    }

    /// True when both handles point at the same loaded model.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M> Deref for ModelHandle<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.0
    }
}

impl<M> std::fmt::Debug for ModelHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelHandle")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

pub enum LoadState<M> {
    NotLoaded,
    Loading { progress: u8 },
    Loaded(ModelHandle<M>),
    Failed(EngineError),
}

impl<M> Clone for LoadState<M> {
    fn clone(&self) -> Self {
        match self {
            Self::NotLoaded => Self::NotLoaded,
            Self::Loading { progress } => Self::Loading {
                progress: *progress,
            },
            Self::Loaded(handle) => Self::Loaded(handle.clone()),
            Self::Failed(err) => Self::Failed(err.clone()),
        }
    }
}

impl<M> LoadState<M> {
    pub fn status(&self) -> ModelStatus {
        match self {
            Self::NotLoaded => ModelStatus::NotLoaded,
            Self::Loading { .. } => ModelStatus::Loading,
            Self::Loaded(_) => ModelStatus::Loaded,
            Self::Failed(err) => ModelStatus::Failed(err.to_string()),
        }
    }
}

/// What status subscribers receive; `Failed` carries the error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ModelStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed(String),
}

type LoadOutcome<M> = Result<ModelHandle<M>, EngineError>;
type SharedLoad<M> = Shared<BoxFuture<'static, LoadOutcome<M>>>;

struct PendingLoad<M> {
    future: SharedLoad<M>,
    cancel: CancellationToken,
}

struct Launch<M> {
    generation: u64,
    cancel: CancellationToken,
    tx: oneshot::Sender<LoadOutcome<M>>,
}

struct Inner<M> {
    state: LoadState<M>,
    /// Bumped by every new load and every teardown; stale loads compare against it.
    generation: u64,
    pending: Option<PendingLoad<M>>,
}

struct Core<P: RecognizerProvider> {
    provider: Arc<P>,
    source: ModelSource,
    inner: Mutex<Inner<P::Model>>,
    status_subscribers: Subscribers<ModelStatus>,
    progress_subscribers: Subscribers<u8>,
}

impl<P: RecognizerProvider> Core<P> {
    fn lock(&self) -> MutexGuard<'_, Inner<P::Model>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report_progress(&self, generation: u64, pct: u8) {
        let pct = pct.min(100);
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            match &mut inner.state {
                LoadState::Loading { progress } => *progress = pct,
                _ => return,
            }
        }
        log::trace!("Model load progress: {pct}%");
        self.progress_subscribers.notify(&pct);
    }

    fn finish_load(&self, generation: u64, outcome: LoadOutcome<P::Model>) -> LoadOutcome<P::Model> {
        let status = {
            let mut inner = self.lock();
            if inner.generation != generation {
                log::info!("Discarding model load superseded by teardown");
                return Err(EngineError::Aborted);
            }
            inner.pending = None;
            inner.state = match &outcome {
                Ok(handle) => LoadState::Loaded(handle.clone()),
                Err(err) => LoadState::Failed(err.clone()),
            };
            inner.state.status()
        };

        if outcome.is_ok() {
            self.progress_subscribers.notify(&100);
        }
        self.status_subscribers.notify(&status);
        outcome
    }
}

/// Cheap to clone; every clone talks to the same model slot.
pub struct ModelManager<P: RecognizerProvider> {
    core: Arc<Core<P>>,
}

impl<P: RecognizerProvider> Clone for ModelManager<P> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<P: RecognizerProvider> ModelManager<P> {
    pub fn new(provider: P, source: ModelSource) -> Self {
        Self {
            core: Arc::new(Core {
                provider: Arc::new(provider),
                source,
                inner: Mutex::new(Inner {
                    state: LoadState::NotLoaded,
                    generation: 0,
                    pending: None,
                }),
                status_subscribers: Subscribers::new(),
                progress_subscribers: Subscribers::new(),
            }),
        }
    }

    pub fn provider(&self) -> Arc<P> {
        Arc::clone(&self.core.provider)
    }

    pub fn source(&self) -> &ModelSource {
        &self.core.source
    }

    pub fn state(&self) -> LoadState<P::Model> {
        self.core.lock().state.clone()
    }

    pub fn status(&self) -> ModelStatus {
        self.core.lock().state.status()
    }

    /// Latest reported progress; 100 once loaded, 0 when idle or failed.
    pub fn progress(&self) -> u8 {
        let inner = self.core.lock();
        match &inner.state {
            LoadState::Loading { progress } => *progress,
            LoadState::Loaded(_) => 100,
            _ => 0,
        }
    }

    /// Returns the loaded model, joining an in-flight load or starting a new one.
    ///
    /// Must be called from within a tokio runtime. A failed load is retried on
    /// the next call; a teardown while loading resolves every waiter with
    /// [`EngineError::Aborted`].
    pub async fn request_model(&self) -> Result<ModelHandle<P::Model>, EngineError> {
        let (future, launch) = {
            let mut inner = self.core.lock();
            if let LoadState::Loaded(handle) = &inner.state {
                return Ok(handle.clone());
            }
            let joined = inner.pending.as_ref().map(|pending| pending.future.clone());
            match joined {
                Some(future) => (future, None),
                None => {
                    let (future, launch) = Self::prepare_load(&mut inner);
                    (future, Some(launch))
                }
            }
        };

        if let Some(launch) = launch {
            self.core.status_subscribers.notify(&ModelStatus::Loading);
            self.core.progress_subscribers.notify(&0);
            self.spawn_load(launch);
        }

        future.await
    }

    fn prepare_load(inner: &mut Inner<P::Model>) -> (SharedLoad<P::Model>, Launch<P::Model>) {
        inner.generation += 1;
        inner.state = LoadState::Loading { progress: 0 };

        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let future = async move { rx.await.unwrap_or(Err(EngineError::Aborted)) }
            .boxed()
            .shared();

        inner.pending = Some(PendingLoad {
            future: future.clone(),
            cancel: cancel.clone(),
        });

        let launch = Launch {
            generation: inner.generation,
            cancel,
            tx,
        };
        (future, launch)
    }

    fn spawn_load(&self, launch: Launch<P::Model>) {
        let Launch {
            generation,
            cancel,
            tx,
        } = launch;
        let core = Arc::clone(&self.core);

        tokio::spawn(async move {
            log::info!("Loading speech model from {:?}", core.source);
            let started = Instant::now();

            let blocking_core = Arc::clone(&core);
            let load = tokio::task::spawn_blocking(move || {
                let progress_core = Arc::clone(&blocking_core);
                blocking_core.provider.load_model(&blocking_core.source, &move |pct| {
                    progress_core.report_progress(generation, pct)
                })
            });

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(EngineError::Aborted),
                joined = load => match joined {
                    Ok(result) => result.map(ModelHandle::new),
                    Err(e) => Err(EngineError::LoadFailure(format!("load task failed: {e}"))),
                },
            };

            match &outcome {
                Ok(_) => log::info!("Speech model loaded in {:.2?}", started.elapsed()),
                Err(EngineError::Aborted) => log::info!("Speech model load cancelled"),
                Err(err) => log::error!("Speech model load failed: {err}"),
            }

            let outcome = core.finish_load(generation, outcome);
            let _ = tx.send(outcome);
        });
    }

    /// Drops the model and cancels any load in flight. Idempotent.
    pub fn teardown(&self) {
        let previous = {
            let mut inner = self.core.lock();
            inner.generation += 1;
            if let Some(pending) = inner.pending.take() {
                pending.cancel.cancel();
            }
            std::mem::replace(&mut inner.state, LoadState::NotLoaded)
        };

        if matches!(previous, LoadState::NotLoaded) {
            return;
        }
        log::info!("Speech model released");
        drop(previous);
        self.core.status_subscribers.notify(&ModelStatus::NotLoaded);
    }

    pub fn subscribe_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ModelStatus) + Send + Sync + 'static,
    {
        self.core.status_subscribers.subscribe(callback)
    }

    pub fn subscribe_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&u8) + Send + Sync + 'static,
    {
        self.core.progress_subscribers.subscribe(callback)
    }
}
