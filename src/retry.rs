use std::thread;
use std::time::Duration;

use anyhow::Error;

/// Whether a failed attempt is worth retrying.
pub trait Classify {
    fn is_retryable(&self, err: &Error) -> bool;
}

/// Classifies `reqwest` transport failures and HTTP status codes the way
/// the upstream kernel's fetch routine does: connection/timeout errors and
/// 5xx responses are retryable, everything else (4xx, bad scheme, bad URL)
/// is terminal.
pub struct HttpClassify;

impl Classify for HttpClassify {
    fn is_retryable(&self, err: &Error) -> bool {
        if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
            if let Some(status) = reqwest_err.status() {
                return status.is_server_error();
            }
            return reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request();
        }
        false
    }
}

/// Exponential-backoff retry wrapper, equivalent to the reference
/// implementation's `retry_gracefully` decorator.
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 4,
            backoff_factor: 1.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        RetryPolicy {
            max_retries,
            backoff_factor,
        }
    }

    /// Runs `op`, retrying on retryable failures (per `classify`) with a
    /// `backoff_factor.powi(retry)` second sleep between attempts. Terminal
    /// failures and retries exhausted both propagate the last error.
    pub fn call<T>(
        &self,
        classify: &dyn Classify,
        mut op: impl FnMut() -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.call_with_sleeper(classify, &mut op, |secs| thread::sleep(Duration::from_secs_f64(secs)))
    }

    /// Same as `call`, but with an injectable sleep function so backoff
    /// timing can be asserted in tests without real delay.
    pub fn call_with_sleeper<T>(
        &self,
        classify: &dyn Classify,
        op: &mut dyn FnMut() -> Result<T, Error>,
        mut sleeper: impl FnMut(f64),
    ) -> Result<T, Error> {
        let mut retry: u32 = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if retry > self.max_retries || !classify.is_retryable(&err) {
                        return Err(err);
                    }
                    let wait_seconds = self.backoff_factor.powi(retry as i32);
                    sleeper(wait_seconds);
                    retry += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;

    struct AlwaysRetryable;
    impl Classify for AlwaysRetryable {
        fn is_retryable(&self, _err: &Error) -> bool {
            true
        }
    }

    struct NeverRetryable;
    impl Classify for NeverRetryable {
        fn is_retryable(&self, _err: &Error) -> bool {
            false
        }
    }

    #[test]
    fn succeeds_without_retry() {
        let policy = RetryPolicy::default();
        let calls = RefCell::new(0);
        let result = policy.call_with_sleeper(
            &AlwaysRetryable,
            &mut || {
                *calls.borrow_mut() += 1;
                Ok::<_, Error>(42)
            },
            |_| panic!("should not sleep"),
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn retries_until_success() {
        let policy = RetryPolicy::new(4, 1.2);
        let calls = RefCell::new(0);
        let sleeps: RefCell<Vec<f64>> = RefCell::new(Vec::new());
        let result = policy.call_with_sleeper(
            &AlwaysRetryable,
            &mut || {
                *calls.borrow_mut() += 1;
                if *calls.borrow() < 3 {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok::<_, Error>("done")
                }
            },
            |secs| sleeps.borrow_mut().push(secs),
        );
        assert_eq!(result.unwrap(), "done");
        assert_eq!(*calls.borrow(), 3);
        assert_eq!(sleeps.borrow().len(), 2);
    }

    #[test]
    fn terminal_failure_is_not_retried() {
        let policy = RetryPolicy::default();
        let calls = RefCell::new(0);
        let result: Result<(), Error> = policy.call_with_sleeper(
            &NeverRetryable,
            &mut || {
                *calls.borrow_mut() += 1;
                Err(anyhow::anyhow!("terminal"))
            },
            |_| panic!("should not sleep"),
        );
        assert!(result.is_err());
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn exhausts_retries_then_fails() {
        let policy = RetryPolicy::new(2, 1.2);
        let calls = RefCell::new(0);
        let result: Result<(), Error> = policy.call_with_sleeper(
            &AlwaysRetryable,
            &mut || {
                *calls.borrow_mut() += 1;
                Err(anyhow::anyhow!("still failing"))
            },
            |_| {},
        );
        assert!(result.is_err());
        // initial attempt + max_retries retries
        assert_eq!(*calls.borrow(), 3);
    }
}
