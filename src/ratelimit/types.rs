use std::time::{Duration, Instant};
use thiserror::Error;

// 某个键在当前窗口内的计数
#[derive(Debug, Clone)]
pub struct Window {
    pub started_at: Instant,
    pub count: u32,
}

impl Window {
    pub fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            count: 0,
        }
    }

    pub fn is_expired(&self, now: Instant, period: Duration) -> bool {
        now.duration_since(self.started_at) >= period
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("请求过于频繁，请 {retry_after_secs} 秒后再试")]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}
