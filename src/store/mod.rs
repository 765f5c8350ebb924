use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub mod postgres_backend;
#[cfg(test)]
pub mod memory;

pub type AccountId = i32;

/// 管理员账号
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub hash_version: i32,
    #[serde(skip)]
    pub password_salt: Option<String>,
    #[serde(skip)]
    pub current_token: Option<String>,
    #[serde(skip)]
    pub token_expiration: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub hash_version: i32,
    pub password_salt: Option<String>,
}

/// 登录尝试记录，只追加
#[derive(Debug, Clone, PartialEq)]
pub struct NewLoginAttempt {
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Database(String),

    #[error("账号不存在: {0}")]
    AccountMissing(AccountId),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// 按用户名查找账号
    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// 按刷新令牌查找账号，只返回令牌未过期的账号
    async fn get_by_token(&self, token: &str) -> Result<Option<Account>, StoreError>;

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// 写入新的刷新令牌并更新最后登录时间
    async fn update_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 仅当当前令牌仍为 `current` 时替换，返回是否替换成功
    async fn rotate_token(
        &self,
        id: AccountId,
        current: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// 清空令牌，重复调用不报错
    async fn invalidate_token(&self, id: AccountId) -> Result<(), StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// 清除所有已过期的令牌，返回受影响的账号数
    async fn cleanup_expired(&self) -> Result<u64, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn create(&self, attempt: NewLoginAttempt) -> Result<(), StoreError>;

    /// 统计某 IP 自 `since` 以来的失败次数
    async fn count_failed_since(&self, ip: &str, since: DateTime<Utc>) -> Result<i64, StoreError>;

    async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub use postgres_backend::{PostgresAccountStore, PostgresLoginAttemptStore};
