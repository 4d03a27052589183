/// Runs an async operation up to `policy.max_attempts` times with a fixed
/// delay between attempts, yielding the last error once attempts run out.
macro_rules! retry_operation {
    ($policy:expr, $context:expr, $operation:expr) => {{
        let policy: $crate::config::RetryPolicy = $policy;
        let max_attempts = policy.max_attempts.max(1);
        let context_value: String = $context.into();
        let mut attempt = 1;

        loop {
            match ($operation).await {
                Ok(value) => break Ok(value),
                Err(err) if attempt >= max_attempts => break Err(err),
                Err(err) => {
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}s.",
                        attempt,
                        max_attempts,
                        context_value,
                        err,
                        policy.delay.as_secs_f64()
                    );
                    tokio::time::sleep(policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }};
}

pub(crate) use retry_operation;

#[cfg(test)]
mod tests {
    use super::retry_operation;
    use crate::config::RetryPolicy;
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_operation!(quick_policy(3), "always failing", async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("boom"))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_operation!(quick_policy(5), "flaky", async {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < 2 {
                Err(anyhow!("transient"))
            } else {
                Ok(call)
            }
        });
        assert_eq!(result.expect("second attempt succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
