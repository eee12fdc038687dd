//! Retry helper for upstream protocol I/O, replacing the fixed `sleep_1s`/
//! `sleep_3s` helpers the teacher used for serial polling with a small
//! exponential backoff suited to client reconnects.

use std::time::Duration;

use anyhow::Result;

/// Run `attempt` up to `max_tries` times, doubling the delay between tries
/// starting at `initial_delay`. Returns the first `Ok`, or the last `Err`.
pub async fn retry_backoff<F, Fut, T>(
    max_tries: u32,
    initial_delay: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_err = None;
    for try_no in 0..max_tries.max(1) {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                log::debug!("attempt {try_no} failed: {e}");
                last_err = Some(e);
                if try_no + 1 < max_tries {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.expect("max_tries >= 1 guarantees at least one attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let result = retry_backoff(3, Duration::from_millis(1), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_backoff(5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("not yet")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_tries() {
        let result: Result<()> =
            retry_backoff(3, Duration::from_millis(1), || async { anyhow::bail!("nope") }).await;
        assert!(result.is_err());
    }
}
