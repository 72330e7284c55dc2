use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Result, ScalerError};

/// Per-call context for scaler evaluations.
///
/// Carries an optional deadline and an optional cancellation signal. Either
/// one aborts the in-flight query by dropping its future, which also hands
/// the underlying connection back to the client's pool.
#[derive(Debug, Clone, Default)]
pub struct PollContext {
    timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Handle used to cancel every evaluation running under a [`PollContext`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated context
    pub fn cancel(&self) {
        // No receivers left means nothing is running, which is fine.
        let _ = self.tx.send(true);
    }
}

impl PollContext {
    /// A context without deadline or cancellation
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every evaluation under this context by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation signal, returning the handle that fires it
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(rx);
        (self, CancelHandle { tx })
    }

    /// Has this context been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drive `fut` to completion unless the deadline passes or the context is cancelled first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(res) => res,
                    Err(_) => Err(ScalerError::Timeout(limit)),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel.clone()) => Err(ScalerError::Cancelled),
            res = bounded => res,
        }
    }
}

async fn wait_cancelled(rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = rx {
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    // Sender gone or no signal attached: never cancelled.
    std::future::pending::<()>().await
}
