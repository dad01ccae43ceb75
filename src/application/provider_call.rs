//! Deadline wrapper for outbound provider calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::domain::foundation::Provider;
use crate::ports::PaymentError;

/// Runs `call` under `deadline`. An elapsed deadline becomes a retryable
/// `Timeout` error; the abandoned call is dropped.
pub async fn with_deadline<T, F>(
    provider: Provider,
    operation: &'static str,
    deadline: Duration,
    call: F,
) -> Result<T, PaymentError>
where
    F: Future<Output = Result<T, PaymentError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                provider = %provider,
                operation,
                deadline_ms = deadline.as_millis() as u64,
                "Provider call timed out"
            );
            Err(PaymentError::timeout(format!(
                "{} {} exceeded {}ms",
                provider,
                operation,
                deadline.as_millis()
            )))
        }
    }
}
