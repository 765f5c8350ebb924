//! 测试用的内存存储

use crate::store::{
    Account, AccountId, AccountStore, LoginAttemptStore, NewAccount,
    NewLoginAttempt, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, id: AccountId) -> Option<Account> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub fn remove(&self, id: AccountId) {
        self.accounts.lock().unwrap().retain(|a| a.id != id);
    }

    pub fn expire_token(&self, id: AccountId) {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
            account.token_expiration = Some(Utc::now() - Duration::seconds(1));
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts.iter().find(|a| a.username == username).cloned())
    }

    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        let now = Utc::now();
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|a| {
                a.current_token.as_deref() == Some(token)
                    && a.token_expiration.map(|exp| exp > now).unwrap_or(false)
            })
            .cloned())
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.iter().any(|a| a.username == account.username) {
            return Err(StoreError::Database(format!(
                "用户名已存在: {}",
                account.username
            )));
        }
        let now = Utc::now();
        let created = Account {
            id: accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1,
            username: account.username,
            password_hash: account.password_hash,
            hash_version: account.hash_version,
            password_salt: account.password_salt,
            current_token: None,
            token_expiration: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        accounts.push(created.clone());
        Ok(created)
    }

    async fn update_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::AccountMissing(id))?;
        let now = Utc::now();
        account.current_token = Some(token.to_string());
        account.token_expiration = Some(expires_at);
        account.last_login = Some(now);
        account.updated_at = now;
        Ok(())
    }

    async fn rotate_token(
        &self,
        id: AccountId,
        current: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts
            .iter_mut()
            .find(|a| a.id == id && a.current_token.as_deref() == Some(current))
        {
            Some(account) => {
                account.current_token = Some(token.to_string());
                account.token_expiration = Some(expires_at);
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_token(&self, id: AccountId) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
            account.current_token = None;
            account.token_expiration = None;
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.accounts.lock().unwrap().len() as i64)
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut cleaned = 0;
        for account in self.accounts.lock().unwrap().iter_mut() {
            if account.token_expiration.map(|exp| exp < now).unwrap_or(false) {
                account.current_token = None;
                account.token_expiration = None;
                cleaned += 1;
            }
        }
        Ok(cleaned)
    }
}

/// 内存中保存的一条登录记录
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub id: i32,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub attempt_at: DateTime<Utc>,
    pub details: Option<String>,
}

#[derive(Default)]
pub struct MemoryLoginAttemptStore {
    attempts: Mutex<Vec<LoginAttempt>>,
}

impl MemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LoginAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    /// 把所有记录的时间往前推，模拟时间流逝
    pub fn backdate(&self, by: Duration) {
        for attempt in self.attempts.lock().unwrap().iter_mut() {
            attempt.attempt_at = attempt.attempt_at - by;
        }
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryLoginAttemptStore {
    async fn create(&self, attempt: NewLoginAttempt) -> Result<(), StoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        let id = attempts.len() as i32 + 1;
        attempts.push(LoginAttempt {
            id,
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
            success: attempt.success,
            attempt_at: Utc::now(),
            details: attempt.details,
        });
        Ok(())
    }

    async fn count_failed_since(&self, ip: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let attempts = self.attempts.lock().unwrap();
        Ok(attempts
            .iter()
            .filter(|a| a.ip_address == ip && !a.success && a.attempt_at > since)
            .count() as i64)
    }

    async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        let before = attempts.len();
        attempts.retain(|a| a.attempt_at >= cutoff);
        Ok((before - attempts.len()) as u64)
    }
}
