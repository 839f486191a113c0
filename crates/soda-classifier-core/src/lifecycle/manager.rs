//! Single-flight lazy initialization of the model runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::loader::RuntimeLoader;
use super::state::{InitializationState, LifecycleSnapshot, ModelRuntimeHandle};
use crate::error::{ClassifierError, ClassifierResult};

/// Owns the runtime and its initialization state.
///
/// # Invariants
///
/// - At most one initialization attempt runs at any time
/// - Callers that wait on an attempt receive that attempt's outcome
/// - A caller that finds `Failed` with no attempt in flight starts a new one
/// - A runtime demoted by `invalidate` is rebuilt, never handed out as an error
/// - Once `Ready`, callers take the read-lock fast path only
pub struct LifecycleManager {
    loader: Box<dyn RuntimeLoader>,
    state: RwLock<InitializationState>,
    /// Held for the full duration of an attempt.
    init_gate: Mutex<()>,
    /// Completed attempts. Written together with `state`.
    attempts: AtomicU64,
    /// `Failed` was set by `invalidate`, not by a load attempt.
    demoted: AtomicBool,
}

impl LifecycleManager {
    pub fn new(loader: impl RuntimeLoader + 'static) -> Self {
        Self::from_boxed(Box::new(loader))
    }

    pub fn from_boxed(loader: Box<dyn RuntimeLoader>) -> Self {
        Self {
            loader,
            state: RwLock::new(InitializationState::Uninitialized),
            init_gate: Mutex::new(()),
            attempts: AtomicU64::new(0),
            demoted: AtomicBool::new(false),
        }
    }

    /// Return the ready handle, initializing first if needed.
    ///
    /// Concurrent callers during an attempt block on it and share its
    /// result; the loader runs once.
    ///
    /// # Errors
    ///
    /// The initialization error of the attempt this call observed. The
    /// error is memoized until the next call retries.
    pub fn ensure_ready(&self) -> ClassifierResult<ModelRuntimeHandle> {
        let observed = {
            let state = self.state.read();
            if let InitializationState::Ready(handle) = &*state {
                return Ok(handle.clone());
            }
            self.attempts.load(Ordering::Acquire)
        };

        let _gate = self.init_gate.lock();

        {
            let state = self.state.read();
            match &*state {
                InitializationState::Ready(handle) => return Ok(handle.clone()),
                InitializationState::Failed(err)
                    if !self.demoted.load(Ordering::Acquire)
                        && self.attempts.load(Ordering::Acquire) != observed =>
                {
                    return Err(err.clone());
                }
                _ => {}
            }
        }

        self.initialize()
    }

    /// Demote `Ready` to `Failed` if `handle` is still the current runtime.
    ///
    /// Returns `false` when the handle is stale (already replaced or
    /// already demoted). The next `ensure_ready` builds a new runtime.
    pub fn invalidate(&self, handle: &ModelRuntimeHandle, cause: &ClassifierError) -> bool {
        let mut state = self.state.write();
        match &*state {
            InitializationState::Ready(current) if current.generation() == handle.generation() => {
                tracing::warn!(
                    generation = handle.generation(),
                    device = handle.device_label(),
                    error_code = cause.error_code(),
                    error = %cause,
                    "Model runtime invalidated"
                );
                *state = InitializationState::Failed(cause.clone());
                self.demoted.store(true, Ordering::Release);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready()
    }

    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.state.read();
        LifecycleSnapshot::capture(&state, self.attempts.load(Ordering::Acquire))
    }

    /// Must be called with `init_gate` held.
    fn initialize(&self) -> ClassifierResult<ModelRuntimeHandle> {
        let attempt = self.attempts.load(Ordering::Acquire) + 1;
        let start = Instant::now();
        tracing::info!(attempt, loader = %self.loader.describe(), "Initializing model runtime");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load()))
            .unwrap_or_else(|payload| {
                Err(ClassifierError::internal(format!(
                    "runtime loader panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let mut state = self.state.write();
        let result = match outcome {
            Ok(runtime) => {
                let handle = ModelRuntimeHandle::new(attempt, runtime);
                tracing::info!(
                    attempt,
                    device = handle.device_label(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Model runtime ready"
                );
                *state = InitializationState::Ready(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                tracing::error!(
                    attempt,
                    error_code = err.error_code(),
                    error = %err,
                    "Model runtime initialization failed"
                );
                *state = InitializationState::Failed(err.clone());
                Err(err)
            }
        };
        self.attempts.store(attempt, Ordering::Release);
        self.demoted.store(false, Ordering::Release);
        result
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("loader", &self.loader.describe())
            .field("state", &*self.state.read())
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
