use std::{future::Future, time::Duration};

use crate::{MAX_BACKOFF, MAX_TRANSPORT_RETRIES};

/// Retries a transport-level operation up to [`MAX_TRANSPORT_RETRIES`]
/// times with exponential backoff capped at [`MAX_BACKOFF`]
/// (`spec.md` §4.B). Callers are responsible for supplying idempotent
/// commands; this only smooths over dropped connections, not command
/// failures (a nonzero exit code is a successful `run`, not an error).
pub async fn with_transport_retry<T, F, Fut>(mut attempt: F) -> anyhow::Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = anyhow::Result<T>>,
{
  let mut backoff = Duration::from_millis(250);
  let mut last_err = None;
  for attempt_no in 0..=MAX_TRANSPORT_RETRIES {
    match attempt().await {
      Ok(value) => return Ok(value),
      Err(e) => {
        tracing::warn!(attempt_no, error = %e, "transport attempt failed");
        last_err = Some(e);
        if attempt_no < MAX_TRANSPORT_RETRIES {
          tokio::time::sleep(backoff).await;
          backoff = (backoff * 2).min(MAX_BACKOFF);
        }
      }
    }
  }
  Err(last_err.unwrap_or_else(|| anyhow::anyhow!("transport operation failed with no recorded error")))
}
