//! Reconnect supervisor for remote read paths.
//!
//! A "no server" failure is the only class worth waiting out: the operation
//! is retried after a pause, up to the configured budget, then surfaced as
//! a driver error. Every other store error propagates immediately. Retried
//! closures must be self-resetting; the cursor open path clears its skip
//! set and re-establishes its iterator inside the closure.

use std::thread;
use std::time::Duration;

use chainstore_common::config::DriverConfig;
use chainstore_common::error::{DriverError, DriverResult, StoreError};

/// Retry policy taken from the driver configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts.max(1),
            pause: Duration::from_millis(config.reconnect_pause_ms),
        }
    }
}

/// Run `op` under the reconnect policy.
pub fn with_reconnect<T>(
    policy: RetryPolicy,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> DriverResult<T> {
    for attempt in 0..policy.attempts {
        if attempt > 0 {
            tracing::warn!(
                pause_ms = policy.pause.as_millis() as u64,
                attempt,
                "no server available, waiting before retry"
            );
            thread::sleep(policy.pause);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_no_server() => {
                tracing::error!(code = err.raw, error = %err.message, "store error on reconnect");
                continue;
            }
            Err(err) => {
                tracing::error!(code = err.raw, error = %err.message, "store error");
                return Err(err.into());
            }
        }
    }
    Err(DriverError::open("fail to connect to the store server"))
}

#[cfg(test)]
mod retry_tests {
    use super::*;
    use chainstore_common::error::StoreErrorCode;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy { attempts, pause: Duration::from_millis(1) }
    }

    #[test]
    fn test_success_passes_through() {
        let result = with_reconnect(fast_policy(3), || Ok::<_, StoreError>(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_no_server_retries_until_success() {
        let mut remaining_failures = 2;
        let result = with_reconnect(fast_policy(5), || {
            if remaining_failures > 0 {
                remaining_failures -= 1;
                Err(StoreError::new(StoreErrorCode::NoServer, "down"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_no_server_exhaustion_raises_open() {
        let result: DriverResult<()> = with_reconnect(fast_policy(3), || {
            Err(StoreError::new(StoreErrorCode::NoServer, "down"))
        });
        assert!(matches!(result, Err(DriverError::Open(_))));
    }

    #[test]
    fn test_other_codes_fail_immediately() {
        let mut calls = 0;
        let result: DriverResult<()> = with_reconnect(fast_policy(5), || {
            calls += 1;
            Err(StoreError::new(StoreErrorCode::Unknown, "boom"))
        });
        assert!(matches!(result, Err(DriverError::Open(_))));
        assert_eq!(calls, 1);
    }
}
