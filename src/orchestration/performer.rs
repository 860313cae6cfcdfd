//! The work performer seam.
//!
//! The orchestrator never looks inside an item's content; it hands the
//! content to a `WorkPerformer` and records whatever comes back.

use crate::error::PerformError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Performs the work described by an item's content.
///
/// Implementations must bound their own execution time if they need to;
/// the orchestrator waits for every dispatched item to settle.
#[async_trait]
pub trait WorkPerformer: Send + Sync {
    async fn execute(&self, content: &str) -> Result<Value, PerformError>;
}

#[async_trait]
impl<P: WorkPerformer + ?Sized> WorkPerformer for Arc<P> {
    async fn execute(&self, content: &str) -> Result<Value, PerformError> {
        (**self).execute(content).await
    }
}

/// Adapts an async closure into a performer.
///
/// ```ignore
/// let performer = FnPerformer::new(|content: String| async move {
///     Ok(serde_json::json!({ "echo": content }))
/// });
/// ```
pub struct FnPerformer<F> {
    f: F,
}

impl<F> FnPerformer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> WorkPerformer for FnPerformer<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, PerformError>> + Send,
{
    async fn execute(&self, content: &str) -> Result<Value, PerformError> {
        (self.f)(content.to_string()).await
    }
}

/// Wraps a performer and fails any execution that outlives `timeout`.
pub struct TimeoutPerformer<P> {
    inner: P,
    timeout: Duration,
}

impl<P> TimeoutPerformer<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<P: WorkPerformer> WorkPerformer for TimeoutPerformer<P> {
    async fn execute(&self, content: &str) -> Result<Value, PerformError> {
        match tokio::time::timeout(self.timeout, self.inner.execute(content)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PerformError::TimedOut(self.timeout)),
        }
    }
}
