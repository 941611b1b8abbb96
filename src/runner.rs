//! Exclusive runner: at most one in-flight run, with coalesced re-runs.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

type RunFn = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

#[derive(Debug, Default)]
struct RunnerState {
    closed: bool,
    running: bool,
    rerun_requested: bool,
}

/// Runs an async job on the tokio runtime, never more than one at a time.
///
/// A `run` request arriving while a run is executing is folded into a single
/// pending re-run, started as soon as the current one finishes, no matter how many
/// requests arrive in between.
pub struct ExclusiveRunner {
    job: Arc<RunFn>,
    state: Arc<Mutex<RunnerState>>,
    idle: Arc<watch::Sender<bool>>,
}

impl ExclusiveRunner {
    pub fn new<F>(job: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let (idle, _) = watch::channel(true);
        Self {
            job: Arc::new(job),
            state: Arc::new(Mutex::new(RunnerState::default())),
            idle: Arc::new(idle),
        }
    }

    /// Request a run. The job is spawned, never executed inline.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime and no run is in flight.
    pub fn run(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            if state.running {
                state.rerun_requested = true;
                return;
            }
            state.running = true;
            self.idle.send_replace(false);
        }

        let job = Arc::clone(&self.job);
        let state = Arc::clone(&self.state);
        let idle = Arc::clone(&self.idle);
        tokio::spawn(async move {
            loop {
                job().await;
                if !finish_run(&state, &idle) {
                    break;
                }
                debug!("Running coalesced re-run");
            }
        });
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Stop accepting runs and wait for the in-flight run, if any.
    pub async fn close(&self) {
        self.state.lock().closed = true;
        let mut idle = self.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

/// Settle a finished run. Returns `true` when a coalesced re-run should start.
///
/// `idle` is published under the state lock, so it always agrees with `running`.
fn finish_run(state: &Mutex<RunnerState>, idle: &watch::Sender<bool>) -> bool {
    let mut state = state.lock();
    if state.rerun_requested && !state.closed {
        state.rerun_requested = false;
        return true;
    }
    state.rerun_requested = false;
    state.running = false;
    idle.send_replace(true);
    false
}
