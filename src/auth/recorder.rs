use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::store::{LoginAttemptStore, NewLoginAttempt};

/// 同时进行中的登录记录写入上限
pub const MAX_IN_FLIGHT_WRITES: u32 = 64;

/// 在后台写入登录尝试记录，写入出错只记日志不重试
pub struct AttemptRecorder<L> {
    store: Arc<L>,
    permits: Arc<Semaphore>,
    capacity: u32,
}

impl<L> AttemptRecorder<L>
where
    L: LoginAttemptStore + 'static,
{
    pub fn new(store: Arc<L>) -> Self {
        Self::with_capacity(store, MAX_IN_FLIGHT_WRITES)
    }

    pub fn with_capacity(store: Arc<L>, capacity: u32) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// 失败记录参与锁定计数，积压时等待许可；成功记录积压时直接丢弃
    pub async fn record(&self, attempt: NewLoginAttempt) {
        let permit = if attempt.success {
            match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(
                        "登录记录写入积压，丢弃来自 {} 的成功记录",
                        attempt.ip_address
                    );
                    return;
                }
            }
        } else {
            match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(
                        "无法写入来自 {} 的失败记录: {}",
                        attempt.ip_address, e
                    );
                    return;
                }
            }
        };

        let store = self.store.clone();
        tokio::spawn(async move {
            let ip = attempt.ip_address.clone();
            if let Err(e) = store.create(attempt).await {
                error!("写入登录记录失败 (IP: {}): {}", ip, e);
            } else {
                debug!("已写入登录记录 (IP: {})", ip);
            }
            drop(permit);
        });
    }

    /// 等待所有进行中的写入完成
    pub async fn drain(&self) {
        match self.permits.acquire_many(self.capacity).await {
            Ok(all) => drop(all),
            Err(e) => warn!("等待登录记录写入完成失败: {}", e),
        }
    }
}
