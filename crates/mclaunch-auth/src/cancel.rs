use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::AuthError;

/// Cloneable cancellation flag shared between the CLI and every suspension
/// point of a launch.
#[derive(Clone, Debug)]
pub struct Cancel {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancel {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancel {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|v| *v).await.is_err() {
            // Sender lives as long as any clone; unreachable in practice.
            std::future::pending::<()>().await;
        }
    }
}

/// Awaits `fut` with an optional deadline, giving up early on cancellation.
///
/// `timeout = None` waits indefinitely.
pub async fn wait_bounded<F: Future>(
    fut: F,
    timeout: Option<Duration>,
    cancel: &Cancel,
    waiting_for: &'static str,
) -> Result<F::Output, AuthError> {
    let bounded = async {
        match timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| AuthError::Timeout { after, waiting_for }),
            None => Ok(fut.await),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        res = bounded => res,
    }
}
