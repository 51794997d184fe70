//! 재시도 정책
//!
//! 외부 호출의 재시도는 코어 컴포넌트가 아니라 오케스트레이션 경계에서
//! 이 정책으로 감쌉니다.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 지수 백오프 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (1 = 재시도 없음)
    pub max_attempts: u32,
    /// 첫 재시도 전 대기 (ms), 이후 2배씩 증가
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// 재시도 없는 정책
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
        }
    }

    /// n번째 실패(0-based) 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }

    /// 실패 시 정책에 따라 재시도
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts => {
                    let backoff = self.backoff(attempt);
                    tracing::warn!(
                        "{} failed: {:#}, retrying in {:?} (attempt {}/{})",
                        what,
                        e,
                        backoff,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff_ms: 100,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = policy
            .run("flaky", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    anyhow::bail!("transient {}", n)
                }
                Ok(n)
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_gives_up() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = RetryPolicy::none()
            .run("broken", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
