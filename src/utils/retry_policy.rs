// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::settings::RetrySettings;
use crate::utils::errors::{Classify, ErrorClass};

/// 重试策略配置
///
/// 纯值类型，可以被多次调用，每次 `execute` 互不影响。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大调用次数（包含第一次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)，抖动只会延长等待
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            backoff_multiplier: settings.multiplier,
            jitter_factor: settings.jitter_factor,
        }
    }
}

/// 重试执行失败
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// 不可重试的错误，立即返回
    #[error("permanent failure: {0}")]
    Permanent(E),

    /// 用尽全部调用次数
    #[error("exhausted retries after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::ExhaustedRetries { last, .. } => last,
        }
    }
}

impl<E> Classify for RetryError<E>
where
    E: Classify,
{
    fn class(&self) -> ErrorClass {
        match self {
            RetryError::Permanent(e) => e.class(),
            // 已经重试过，上层不再重试
            RetryError::ExhaustedRetries { .. } => ErrorClass::Permanent,
        }
    }
}

impl RetryPolicy {
    /// 创建快速重试策略（更短的退避时间）
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            jitter_factor: 0.1,
        }
    }

    /// 计算第 `attempt` 次失败后的退避时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_secs = self.initial_backoff.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        let jitter_range = capped_backoff * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::random_range(0.0..jitter_range)
        } else {
            0.0
        };

        Duration::from_secs_f64(capped_backoff + jitter)
    }

    /// 退避时间与服务端提示取较大者
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.calculate_backoff(attempt);
        match retry_after {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        }
    }

    /// 是否还能再调用一次
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// 执行操作，遇到可重试错误时退避重试
    ///
    /// 闭包参数为当前调用序号（从1开始）。
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
                Err(e) if !self.should_retry(attempt) => {
                    return Err(RetryError::ExhaustedRetries {
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    let delay = self.delay_for(attempt, e.retry_after());
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug)]
    struct FakeError {
        class: ErrorClass,
        retry_after: Option<Duration>,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "fake {}", self.class)
        }
    }

    impl Classify for FakeError {
        fn class(&self) -> ErrorClass {
            self.class
        }

        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn transient() -> FakeError {
        FakeError {
            class: ErrorClass::Transient,
            retry_after: None,
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let policy = no_jitter();
        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_calculate_backoff_jitter_only_extends() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let backoff = policy.calculate_backoff(2);
            assert!(backoff >= Duration::from_secs(2));
            assert!(backoff <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_calculate_backoff_max_limit() {
        let mut policy = no_jitter();
        policy.max_backoff = Duration::from_secs(5);
        assert_eq!(policy.calculate_backoff(10), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_after_hint_wins_when_larger() {
        let policy = no_jitter();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_millis(10))),
            Duration::from_secs(4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_bounded() {
        let policy = no_jitter();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts);
        match result {
            Err(RetryError::ExhaustedRetries { attempts, .. }) => {
                assert_eq!(attempts, policy.max_attempts)
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // 1 + 2 + 4 秒
        assert!(Instant::now().duration_since(start) >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_returns_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FakeError {
                        class: ErrorClass::Permanent,
                        retry_after: None,
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Permanent(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let policy = no_jitter();
        let result = policy
            .execute(|attempt| async move {
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_exhausted_is_reported_as_permanent() {
        let err: RetryError<FakeError> = RetryError::ExhaustedRetries {
            attempts: 4,
            last: transient(),
        };
        assert_eq!(err.class(), ErrorClass::Permanent);
    }
}
