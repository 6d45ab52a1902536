pub mod access;
pub mod auth;
pub mod boards;
pub mod cards;
pub mod connections;
pub mod emails;
pub mod error;
pub mod export;
pub mod file_store;
pub mod files;
pub mod middleware;
pub mod search;
pub mod shares;
pub mod tags;

#[cfg(test)]
pub(crate) mod test_support;

use error::ApiError;
use tracing::error;

/// Run a synchronous datastore operation off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("worker task failed"))
    })?
}

/// Run a request's work as its own task so it completes even if the caller
/// goes away before the response is written.
pub(crate) async fn detached<F, T>(work: F) -> Result<T, ApiError>
where
    F: std::future::Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work).await.map_err(|e| {
        error!("detached task join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("worker task failed"))
    })?
}
