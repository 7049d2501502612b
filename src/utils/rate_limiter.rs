// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// 滑动窗口限流器
///
/// 记录最近一个窗口内的放行时间戳，任意长度为 `window` 的区间内放行不超过 `capacity` 次。
/// 等待者持锁休眠，`tokio::sync::Mutex` 按先来先服务唤醒，因此不会饿死。
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// 创建限流器：每 `window` 最多 `capacity` 次
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            capacity,
            window,
            grants: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// 每分钟最多 `rpm` 次
    pub fn per_minute(rpm: u32) -> Self {
        Self::new(rpm, Duration::from_secs(60))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 获取一个请求名额，必要时等待
    pub async fn acquire(&self) {
        let mut grants = self.grants.lock().await;
        loop {
            let now = Instant::now();
            while let Some(front) = grants.front() {
                if now.duration_since(*front) >= self.window {
                    grants.pop_front();
                } else {
                    break;
                }
            }

            if grants.len() < self.capacity {
                grants.push_back(now);
                return;
            }

            // 队列已满时队首必然存在
            if let Some(front) = grants.front().copied() {
                let wake_at = front + self.window;
                debug!(
                    wait_ms = wake_at.saturating_duration_since(now).as_millis() as u64,
                    "Rate limit reached, waiting for a free slot"
                );
                tokio::time::sleep_until(wake_at).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_burst_is_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_bound_holds() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(1)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for i in 0..grants.len() - 3 {
            assert!(
                grants[i + 3].duration_since(grants[i]) >= Duration::from_secs(1),
                "more than 3 grants within one window starting at grant {}",
                i
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_minute() {
        let limiter = RateLimiter::per_minute(10);
        assert_eq!(limiter.capacity(), 10);
        assert_eq!(limiter.window(), Duration::from_secs(60));

        let start = Instant::now();
        for _ in 0..11 {
            limiter.acquire().await;
        }
        assert!(Instant::now().duration_since(start) >= Duration::from_secs(60));
    }
}
