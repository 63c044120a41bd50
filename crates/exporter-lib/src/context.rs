//! Cancellation and deadline propagation for scrape cycles
//!
//! A [`ScrapeContext`] is handed to every remote call made during a cycle.
//! Cancelling it, or letting its deadline pass, drops whatever request is
//! still in flight.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::client::ClientError;

/// Caller-supplied cancellation signal and optional deadline
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Cancels every clone of the context it was created with
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl ScrapeContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self {
            cancel,
            deadline: None,
        }
    }

    /// A context plus the handle that cancels it
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, cancel) = watch::channel(false);
        (
            Self {
                cancel,
                deadline: None,
            },
            CancelHandle { tx },
        )
    }

    /// Derive a context that expires after `timeout`, or earlier if the parent does
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };

        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled; pends forever if it never can be
    async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Run `fut` unless the context finishes first.
    ///
    /// A context that is already cancelled or expired never polls `fut`.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        if self.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if self.is_expired() {
            return Err(ClientError::DeadlineExceeded);
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ClientError::Cancelled),
            _ = self.expired() => Err(ClientError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
