use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api::{TelegramApi, Update};

/// Consumes updates delivered by the poll loop. Implementations must not
/// return errors; anything recoverable is handled (and logged) inside.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: Update);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 250, max_delay_ms: 30_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Long-poll loop over `getUpdates`. Transport failures back off with a
/// capped exponential delay and never terminate the loop; a successful poll
/// resets the backoff.
pub struct LongPollRunner {
    api: Arc<dyn TelegramApi>,
    handler: Arc<dyn UpdateHandler>,
    poll_timeout_secs: u64,
    retry_policy: RetryPolicy,
}

impl LongPollRunner {
    pub fn new(
        api: Arc<dyn TelegramApi>,
        handler: Arc<dyn UpdateHandler>,
        poll_timeout_secs: u64,
    ) -> Self {
        Self { api, handler, poll_timeout_secs, retry_policy: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn start(&self) {
        info!(
            event_name = "ingress.telegram.poll_started",
            poll_timeout_secs = self.poll_timeout_secs,
            "long-poll loop started"
        );

        let mut offset = 0_i64;
        let mut failures = 0_u32;

        loop {
            match self.api.get_updates(offset, self.poll_timeout_secs).await {
                Ok(updates) => {
                    failures = 0;
                    for update in updates {
                        // Advance past the update before handling it so a
                        // handler panic cannot replay it forever.
                        offset = offset.max(update.update_id + 1);
                        self.handler.handle(update).await;
                    }
                }
                Err(error) => {
                    let delay = self.retry_policy.backoff(failures);
                    warn!(
                        event_name = "ingress.telegram.poll_failed",
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "poll failed, backing off"
                    );
                    failures = failures.saturating_add(1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Single poll iteration, exposed for tests.
    pub async fn poll_once(&self, offset: i64) -> i64 {
        match self.api.get_updates(offset, self.poll_timeout_secs).await {
            Ok(updates) => {
                let mut next = offset;
                for update in updates {
                    next = next.max(update.update_id + 1);
                    self.handler.handle(update).await;
                }
                next
            }
            Err(_) => offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{LongPollRunner, RetryPolicy, UpdateHandler};
    use crate::api::{ApiError, ScriptedTelegramApi, Update};

    #[derive(Default)]
    struct CollectingHandler {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateHandler for CollectingHandler {
        async fn handle(&self, update: Update) {
            self.seen.lock().expect("handler mutex").push(update.update_id);
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy { base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(1).as_millis(), 200);
        assert_eq!(policy.backoff(10).as_millis(), 1_000);
        assert_eq!(policy.backoff(u32::MAX).as_millis(), 1_000);
    }

    #[tokio::test]
    async fn poll_advances_the_offset_past_handled_updates() {
        let api = Arc::new(ScriptedTelegramApi::new());
        api.push_batch(vec![
            Update { update_id: 7, ..Update::default() },
            Update { update_id: 9, ..Update::default() },
        ]);

        let handler = Arc::new(CollectingHandler::default());
        let runner = LongPollRunner::new(api, Arc::clone(&handler) as Arc<dyn UpdateHandler>, 25);

        let next = runner.poll_once(0).await;
        assert_eq!(next, 10);
        assert_eq!(*handler.seen.lock().unwrap(), vec![7, 9]);
    }

    #[tokio::test]
    async fn poll_failure_keeps_the_offset() {
        let api = Arc::new(ScriptedTelegramApi::new());
        api.push_failure(ApiError::Request("connection reset".to_string()));

        let handler = Arc::new(CollectingHandler::default());
        let runner = LongPollRunner::new(api, Arc::clone(&handler) as Arc<dyn UpdateHandler>, 25);

        let next = runner.poll_once(3).await;
        assert_eq!(next, 3);
        assert!(handler.seen.lock().unwrap().is_empty());
    }
}
