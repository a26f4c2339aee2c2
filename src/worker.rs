//! Lifecycle shared by the background loops.
//!
//! A loop runs as a task and is stopped cooperatively through a cancellation token. Loops wait in
//! steps of at most one second, so a stop request takes effect within about a second.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Granularity of the loops' timers.
pub(crate) const TICK: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

pub(crate) struct Worker {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            token: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawn the loop. A worker only ever runs once.
    pub fn spawn<F, Fut>(&mut self, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.state() != LoopState::Idle {
            log::warn!("{} loop was already started", self.name);
            return;
        }
        log::info!("Starting {} loop", self.name);
        self.handle = Some(tokio::spawn(f(self.token.clone())));
    }

    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Wait for the loop to exit. Returns immediately if it never ran or was already joined.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log::warn!("{} loop failed: {err}", self.name);
            }
            log::info!("Stopped {} loop", self.name);
        }
    }

    pub async fn stop(&mut self) {
        self.request_stop();
        self.join().await;
    }

    pub fn state(&self) -> LoopState {
        match &self.handle {
            Some(handle) if !handle.is_finished() => LoopState::Running,
            Some(_) => LoopState::Stopped,
            None if self.token.is_cancelled() => LoopState::Stopped,
            None => LoopState::Idle,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Sleep for `duration` in steps of [`TICK`]. Returns `false` if cancelled meanwhile.
pub(crate) async fn sleep(token: &CancellationToken, duration: Duration) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        let step = remaining.min(TICK);
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(step) => {},
        }
        remaining -= step;
    }
    !token.is_cancelled()
}
