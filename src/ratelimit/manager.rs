use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::types::{RateLimitExceeded, Window};
use crate::config::RateLimitConfig;

// 固定窗口限流器，按 "接口:IP" 计数
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    requests: u32,
    period: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, config: &RateLimitConfig) -> Self {
        info!(
            "初始化限流器 {} - 每 {} 秒 {} 次",
            name, config.period_secs, config.requests
        );
        Self {
            name,
            requests: config.requests,
            period: Duration::from_secs(config.period_secs),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let mut windows = self.windows();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(now));

        if window.is_expired(now, self.period) {
            *window = Window::new(now);
        }

        if window.count >= self.requests {
            let elapsed = now.duration_since(window.started_at);
            let retry_after_secs = self.period.saturating_sub(elapsed).as_secs().max(1);
            warn!("{} 限流触发 - {}", self.name, key);
            return Err(RateLimitExceeded { retry_after_secs });
        }

        window.count += 1;
        debug!("{} 请求计数 {}/{} - {}", self.name, window.count, self.requests, key);
        Ok(())
    }

    // 清理已过期的窗口
    pub fn cleanup_stale(&self) {
        self.cleanup_stale_at(Instant::now());
    }

    fn cleanup_stale_at(&self, now: Instant) {
        let mut windows = self.windows();
        let before_count = windows.len();
        windows.retain(|_, w| !w.is_expired(now, self.period));
        let removed = before_count - windows.len();
        if removed > 0 {
            info!("{} 清理了 {} 个过期的限流窗口", self.name, removed);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows().len()
    }
}
