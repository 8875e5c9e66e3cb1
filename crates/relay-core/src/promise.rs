//! Single-resolution futures
//!
//! A [`Resolver`] settles its [`Promise`] at most once. Every later call to
//! [`Resolver::resolve`] or [`Resolver::reject`] returns `false` and has no effect,
//! which is what lets a timer and a listener race for the same promise.

use crate::dispatcher::DispatchError;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Lifecycle of a promise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

type Outcome<T> = Result<T, DispatchError>;

/// Settling side of a promise
pub struct Resolver<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>,
    state: Arc<Mutex<PromiseState>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Resolver<T> {
    /// Fulfil the promise; returns `false` if it was already settled
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject the promise; returns `false` if it was already settled
    pub fn reject(&self, error: DispatchError) -> bool {
        self.settle(Err(error))
    }

    /// Current state of the promise
    pub fn state(&self) -> PromiseState {
        *self.state.lock()
    }

    /// Check if the promise has not been settled yet
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let mut guard = self.sender.lock();
        let Some(sender) = guard.take() else {
            return false;
        };
        *self.state.lock() = if outcome.is_ok() {
            PromiseState::Fulfilled
        } else {
            PromiseState::Rejected
        };
        // The receiving side may already be gone; settling still counts.
        let _ = sender.send(outcome);
        true
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &self.state())
            .finish()
    }
}

/// Awaitable side of a single-resolution future
///
/// Resolves to the fulfilled value or the rejection error. If every resolver is
/// dropped without settling, the promise rejects with [`DispatchError::Cancelled`].
pub struct Promise<T> {
    receiver: oneshot::Receiver<Outcome<T>>,
    state: Arc<Mutex<PromiseState>>,
}

impl<T> Promise<T> {
    /// Create a pending promise together with its resolver
    #[must_use]
    pub fn pending() -> (Resolver<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(Mutex::new(PromiseState::Pending));
        (
            Resolver {
                sender: Arc::new(Mutex::new(Some(sender))),
                state: Arc::clone(&state),
            },
            Self { receiver, state },
        )
    }

    /// Create an already fulfilled promise
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let (resolver, promise) = Self::pending();
        resolver.resolve(value);
        promise
    }

    /// Create an already rejected promise
    #[must_use]
    pub fn rejected(error: DispatchError) -> Self {
        let (resolver, promise) = Self::pending();
        resolver.reject(error);
        promise
    }

    /// Current state of the promise
    pub fn state(&self) -> PromiseState {
        *self.state.lock()
    }

    /// Map the fulfilled value, propagating rejections
    pub fn then<U, F>(self, f: F) -> impl Future<Output = Result<U, DispatchError>>
    where
        F: FnOnce(T) -> U,
    {
        self.map(move |outcome| outcome.map(f))
    }

    /// Recover from a rejection
    pub fn catch<F>(self, f: F) -> impl Future<Output = T>
    where
        F: FnOnce(DispatchError) -> T,
    {
        self.map(move |outcome| outcome.unwrap_or_else(f))
    }

    /// Wait for every promise, failing on the first rejection
    ///
    /// Results keep the order of the input.
    pub async fn all(promises: Vec<Self>) -> Result<Vec<T>, DispatchError> {
        futures::future::try_join_all(promises).await
    }

    /// Settle with whichever promise settles first
    pub async fn race(promises: Vec<Self>) -> Result<T, DispatchError> {
        if promises.is_empty() {
            return Err(DispatchError::Cancelled);
        }
        let (outcome, _, _) = futures::future::select_all(promises).await;
        outcome
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}
