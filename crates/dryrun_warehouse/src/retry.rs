//! Timeout retries for warehouse calls.
//!
//! Dry run jobs occasionally time out on the warehouse side under load.
//! Those are retried with exponential backoff; every other error, and every
//! rejection, is returned immediately.

use crate::warehouse::{QueryOutcome, Warehouse, WarehouseError, WarehouseResult};
use async_trait::async_trait;
use dryrun_core::{Table, TableRef};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempts per warehouse call, including the first
pub const MAX_ATTEMPT_NUMBER: u32 = 5;

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `multiplier * 2^(n-1)`
    pub multiplier: Duration,
    /// Lower bound on a delay
    pub min: Duration,
    /// Upper bound on a delay
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPT_NUMBER,
            multiplier: Duration::from_millis(500),
            min: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count without any waiting, for tests and offline runs
    #[must_use]
    pub fn no_delay() -> Self {
        Self {
            max_attempts: MAX_ATTEMPT_NUMBER,
            multiplier: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Set the attempt count
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.multiplier.saturating_mul(1_u32 << exponent);
        base.clamp(self.min, self.max.max(self.min))
    }

    /// Run `operation` until it succeeds, fails with a non-timeout error, or
    /// the attempts run out
    ///
    /// # Errors
    ///
    /// Returns the first non-timeout error, or `RetriesExhausted` when every
    /// attempt timed out
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> WarehouseResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = WarehouseResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(WarehouseError::Timeout { message }) => {
                    if attempt >= self.max_attempts {
                        return Err(WarehouseError::RetriesExhausted {
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Warehouse call timed out, retrying: {}",
                        message
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// A warehouse wrapper retrying timeouts according to a [`RetryPolicy`]
pub struct RetryingWarehouse<W> {
    inner: W,
    policy: RetryPolicy,
}

impl<W: Warehouse> RetryingWarehouse<W> {
    /// Wrap `inner` with the default policy
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the policy
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Wrapped warehouse
    #[must_use]
    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait]
impl<W: Warehouse> Warehouse for RetryingWarehouse<W> {
    async fn query(&self, sql: &str) -> WarehouseResult<QueryOutcome> {
        self.policy.run("query", || self.inner.query(sql)).await
    }

    async fn get_node_schema(&self, table_ref: &TableRef) -> WarehouseResult<Option<Table>> {
        self.policy
            .run("get_node_schema", || self.inner.get_node_schema(table_ref))
            .await
    }

    async fn node_exists(&self, table_ref: &TableRef) -> WarehouseResult<bool> {
        self.policy
            .run("node_exists", || self.inner.node_exists(table_ref))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWarehouse;
    use crate::warehouse::RejectionKind;

    fn timeout() -> WarehouseError {
        WarehouseError::Timeout {
            message: "Dry run query timed out".to_string(),
        }
    }

    #[test]
    fn test_delays_grow_and_clamp() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_no_delay_policy() {
        let policy = RetryPolicy::no_delay();
        assert_eq!(policy.max_attempts, MAX_ATTEMPT_NUMBER);
        assert_eq!(policy.delay_for_attempt(4), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_timeouts_retried_until_exhausted() {
        let memory = MemoryWarehouse::new().with_default_response(Err(timeout()));
        let warehouse = RetryingWarehouse::new(memory).with_policy(RetryPolicy::no_delay());

        let err = warehouse.query("SELECT 1").await.unwrap_err();
        assert!(matches!(
            err,
            WarehouseError::RetriesExhausted { attempts: 5, .. }
        ));
        assert_eq!(warehouse.inner().query_count(), 5);
    }

    #[tokio::test]
    async fn test_rejections_not_retried() {
        let memory = MemoryWarehouse::new().with_default_response(Ok(QueryOutcome::rejected(
            RejectionKind::BadRequest,
            "Syntax error",
        )));
        let warehouse = RetryingWarehouse::new(memory).with_policy(RetryPolicy::no_delay());

        let outcome = warehouse.query("SELEC 1").await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(warehouse.inner().query_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_not_retried() {
        let memory = MemoryWarehouse::new().with_default_response(Err(WarehouseError::Transport {
            message: "connection reset".to_string(),
        }));
        let warehouse = RetryingWarehouse::new(memory).with_policy(RetryPolicy::no_delay());

        let err = warehouse.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, WarehouseError::Transport { .. }));
        assert_eq!(warehouse.inner().query_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_timeout() {
        let memory = MemoryWarehouse::new()
            .on_query_once("SELECT 1", Err(timeout()))
            .with_default_response(Ok(QueryOutcome::Success(Table::default())));
        let warehouse = RetryingWarehouse::new(memory).with_policy(RetryPolicy::no_delay());

        assert!(warehouse.query("SELECT 1").await.unwrap().is_success());
        assert_eq!(warehouse.inner().query_count(), 2);
    }
}
