use crate::store::{
    Account, AccountId, AccountStore, LoginAttemptStore, NewAccount, NewLoginAttempt, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::PgPool;

const ACCOUNT_COLUMNS: &str = "id, username, password_hash, hash_version, password_salt, \
     current_token, token_expiration, last_login, created_at, updated_at";

pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM admins WHERE username = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("按用户名查询管理员失败: {}", e)))
    }

    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM admins WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("按ID查询管理员失败: {}", e)))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM admins WHERE current_token = $1 AND token_expiration > NOW()",
            ACCOUNT_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("按令牌查询管理员失败: {}", e)))
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let created = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO admins (username, password_hash, hash_version, password_salt, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.hash_version)
        .bind(&account.password_salt)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("创建管理员失败: {}", e)))?;

        info!("创建管理员 {} (ID: {})", created.username, created.id);
        Ok(created)
    }

    async fn update_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE admins
            SET current_token = $1, token_expiration = $2, last_login = NOW(), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("更新管理员令牌失败: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountMissing(id));
        }

        Ok(())
    }

    async fn rotate_token(
        &self,
        id: AccountId,
        current: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE admins
            SET current_token = $1, token_expiration = $2, updated_at = NOW()
            WHERE id = $3 AND current_token = $4
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .bind(current)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("轮换管理员令牌失败: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_token(&self, id: AccountId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE admins
            SET current_token = NULL, token_expiration = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("注销管理员令牌失败: {}", e)))?;

        Ok(())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("统计管理员数量失败: {}", e)))
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE admins
            SET current_token = NULL, token_expiration = NULL, updated_at = NOW()
            WHERE token_expiration < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("清理过期令牌失败: {}", e)))?;

        debug!("清理过期令牌，影响 {} 行", result.rows_affected());
        Ok(result.rows_affected())
    }
}

pub struct PostgresLoginAttemptStore {
    pool: PgPool,
}

impl PostgresLoginAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptStore for PostgresLoginAttemptStore {
    async fn create(&self, attempt: NewLoginAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (ip_address, user_agent, success, attempt_at, details)
            VALUES ($1, $2, $3, NOW(), $4)
            "#,
        )
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.success)
        .bind(&attempt.details)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("写入登录尝试失败: {}", e)))?;

        Ok(())
    }

    async fn count_failed_since(&self, ip: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE ip_address = $1 AND success = FALSE AND attempt_at > $2
            "#,
        )
        .bind(ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("统计失败登录次数失败: {}", e)))
    }

    async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE attempt_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("清理旧登录记录失败: {}", e)))?;

        if result.rows_affected() > 0 {
            info!("清理了 {} 条旧登录记录", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}
