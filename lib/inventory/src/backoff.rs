use std::{future::Future, time::Duration};

/// `spec.md` §4.C: transient provider errors are retried with jittered
/// backoff up to 60s; past that the caller sees the error and the partial
/// tag state is left for the next reconcile pass.
const MAX_TOTAL_BACKOFF: Duration = Duration::from_secs(60);

pub async fn with_jittered_backoff<T, F, Fut>(mut attempt: F) -> anyhow::Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = anyhow::Result<T>>,
{
  let mut waited = Duration::ZERO;
  let mut backoff = Duration::from_millis(500);
  loop {
    match attempt().await {
      Ok(value) => return Ok(value),
      Err(e) if waited < MAX_TOTAL_BACKOFF => {
        let jitter = Duration::from_millis(rand::random::<u64>() % 250);
        let sleep_for = backoff + jitter;
        tracing::warn!(error = %e, waited_ms = waited.as_millis(), "transient provider error, retrying");
        tokio::time::sleep(sleep_for).await;
        waited += sleep_for;
        backoff = (backoff * 2).min(MAX_TOTAL_BACKOFF);
      }
      Err(e) => return Err(e),
    }
  }
}
