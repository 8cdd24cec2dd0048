use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{resource} not ready after {after:?}")]
pub struct WaitTimeout {
    pub resource: String,
    pub after: Duration,
}

/// Await `fut`, giving up once `timeout` has elapsed.
///
/// The future is dropped on timeout, so anything it holds is released before
/// the error reaches the caller.
pub async fn wait_with_timeout<F>(
    fut: F,
    timeout: Duration,
    resource_name: &str,
) -> Result<F::Output, WaitTimeout>
where
    F: Future,
{
    tracing::trace!(resource = resource_name, ?timeout, "Waiting");

    match tokio::time::timeout(timeout, fut).await {
        Ok(output) => Ok(output),
        Err(_) => {
            tracing::debug!(resource = resource_name, ?timeout, "Wait timed out");
            Err(WaitTimeout {
                resource: resource_name.to_string(),
                after: timeout,
            })
        }
    }
}
