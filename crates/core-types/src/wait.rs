//! Bounded poll-until-condition helpers
//!
//! Every wait in the engine is an immediate probe followed by fixed-interval
//! re-probes until a deadline. Probe errors mean "not yet".

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

/// Poll `probe` until it yields `Some`, or `timeout` elapses.
pub async fn poll_for<T, E, F, Fut>(mut probe: F, timeout: Duration, interval: Duration) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    let deadline = Instant::now() + timeout;
    loop {
        match probe().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(err) => debug!("probe not ready: {}", err),
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Poll a boolean condition; returns whether it became true in time.
pub async fn poll_until<E, F, Fut>(mut probe: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    poll_for(
        || {
            let fut = probe();
            async move { fut.await.map(|ok| ok.then_some(())) }
        },
        timeout,
        interval,
    )
    .await
    .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn immediate_success_skips_sleeping() {
        let start = Instant::now();
        let ok = poll_until(
            || async { Ok::<_, String>(true) },
            Duration::from_secs(2),
            Duration::from_millis(100),
        )
        .await;
        assert!(ok);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_bound() {
        let start = Instant::now();
        let ok = poll_until(
            || async { Ok::<_, String>(false) },
            Duration::from_millis(250),
            Duration::from_millis(100),
        )
        .await;
        assert!(!ok);
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_treated_as_not_ready() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let value = poll_for(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not rendered".to_string())
                    } else {
                        Ok(Some(n))
                    }
                }
            },
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(value, Some(2));
    }
}
