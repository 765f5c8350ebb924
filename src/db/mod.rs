use log::{error, info};
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct DbInitError {
    context: &'static str,
    #[source]
    source: sqlx::Error,
}

fn step(context: &'static str) -> impl FnOnce(sqlx::Error) -> DbInitError {
    move |source| DbInitError { context, source }
}

pub struct DbInitializer {
    pool: PgPool,
}

impl DbInitializer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn existing_columns(&self, table: &str) -> Result<Vec<String>, DbInitError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT column_name::TEXT
            FROM information_schema.columns
            WHERE table_name = $1
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(step("检查表结构失败"))
    }

    /// 初始化管理员表
    pub async fn init_admin_tables(&self) -> Result<(), DbInitError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS admins (
                id SERIAL PRIMARY KEY,
                username VARCHAR(50) UNIQUE NOT NULL,
                password_hash VARCHAR NOT NULL,
                hash_version INTEGER NOT NULL DEFAULT 2,
                password_salt VARCHAR,
                current_token TEXT,
                token_expiration TIMESTAMPTZ,
                last_login TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(step("创建管理员表失败"))?;

        // 旧表缺少的列按需补齐，已有账号视为旧版哈希
        let existing_columns = self.existing_columns("admins").await?;

        if !existing_columns.iter().any(|c| c == "hash_version") {
            info!("为管理员表添加 hash_version 列");
            sqlx::query("ALTER TABLE admins ADD COLUMN hash_version INTEGER NOT NULL DEFAULT 1")
                .execute(&self.pool)
                .await
                .map_err(step("添加hash_version列失败"))?;
        }

        if !existing_columns.iter().any(|c| c == "password_salt") {
            sqlx::query("ALTER TABLE admins ADD COLUMN password_salt VARCHAR")
                .execute(&self.pool)
                .await
                .map_err(step("添加password_salt列失败"))?;
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_admins_current_token ON admins(current_token)")
            .execute(&self.pool)
            .await
            .map_err(step("创建令牌索引失败"))?;

        Ok(())
    }

    /// 初始化登录记录表
    pub async fn init_login_attempt_tables(&self) -> Result<(), DbInitError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS login_attempts (
                id SERIAL PRIMARY KEY,
                ip_address VARCHAR(64) NOT NULL,
                user_agent TEXT NOT NULL DEFAULT '',
                success BOOLEAN NOT NULL,
                attempt_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                details TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(step("创建登录记录表失败"))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_login_attempts_ip_time
            ON login_attempts(ip_address, attempt_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(step("创建登录记录索引失败"))?;

        Ok(())
    }
}

/// 初始化所有数据库表
pub async fn initialize_db(pool: PgPool) -> Result<(), DbInitError> {
    info!("开始初始化数据库...");
    let initializer = DbInitializer::new(pool);

    initializer.init_admin_tables().await.map_err(|e| {
        error!("管理员表初始化失败: {}", e);
        e
    })?;

    initializer.init_login_attempt_tables().await.map_err(|e| {
        error!("登录记录表初始化失败: {}", e);
        e
    })?;

    info!("数据库初始化完成");
    Ok(())
}
