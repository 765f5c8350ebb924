use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use super::error::AuthError;
use super::hasher::PasswordHasher;
use super::jwt::TokenIssuer;
use super::recorder::AttemptRecorder;
use super::types::{
    Authenticated, AuthenticatedAdmin, HashVersion, LoginRequest, LoginSuccess,
    PresentedCredentials, TokenPair,
};
use crate::config::{AuthConfig, LockoutPolicy};
use crate::store::{Account, AccountId, AccountStore, LoginAttemptStore, NewAccount, NewLoginAttempt};

/// 管理员会话：登录、请求认证、刷新、登出以及后台清理
pub struct SessionManager<A, L> {
    accounts: Arc<A>,
    attempts: Arc<L>,
    hasher: Arc<PasswordHasher>,
    issuer: TokenIssuer,
    recorder: AttemptRecorder<L>,
    lockout: LockoutPolicy,
    attempt_retention: Duration,
}

impl<A, L> SessionManager<A, L>
where
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    pub fn new(accounts: Arc<A>, attempts: Arc<L>, config: &AuthConfig) -> Self {
        info!("初始化会话管理器");
        Self::from_parts(
            accounts,
            attempts,
            PasswordHasher::new(&config.password_pepper),
            TokenIssuer::new(
                &config.jwt_secret,
                config.access_token_ttl,
                config.refresh_token_ttl,
            ),
            config.lockout,
            config.attempt_retention,
        )
    }

    pub fn from_parts(
        accounts: Arc<A>,
        attempts: Arc<L>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
        lockout: LockoutPolicy,
        attempt_retention: Duration,
    ) -> Self {
        Self {
            recorder: AttemptRecorder::new(attempts.clone()),
            accounts,
            attempts,
            hasher: Arc::new(hasher),
            issuer,
            lockout,
            attempt_retention,
        }
    }

    #[cfg(test)]
    pub fn with_recorder_capacity(mut self, capacity: u32) -> Self {
        self.recorder = AttemptRecorder::with_capacity(self.attempts.clone(), capacity);
        self
    }

    #[cfg(test)]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// 记录一次失败的登录尝试（例如请求参数校验失败）
    pub async fn note_failed_attempt(&self, ip: &str, user_agent: &str, details: &str) {
        self.record_attempt(ip, user_agent, false, details).await;
    }

    async fn login_failed(&self, req: &LoginRequest, details: &str) {
        self.record_attempt(&req.ip_address, &req.user_agent, false, details)
            .await;
    }

    async fn record_attempt(&self, ip: &str, user_agent: &str, success: bool, details: &str) {
        self.recorder
            .record(NewLoginAttempt {
                ip_address: ip.to_string(),
                user_agent: user_agent.to_string(),
                success,
                details: if details.is_empty() {
                    None
                } else {
                    Some(details.to_string())
                },
            })
            .await;
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginSuccess, AuthError> {
        info!("管理员登录请求 - 用户: {}, IP: {}", req.username, req.ip_address);

        // 封锁检查在查询账号之前进行
        let since = Utc::now() - self.lockout.window;
        let failed = match self
            .attempts
            .count_failed_since(&req.ip_address, since)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("查询失败登录次数出错: {}", e);
                self.login_failed(req, "failed to check login attempts").await;
                return Err(e.into());
            }
        };

        if failed >= self.lockout.max_failed_attempts {
            warn!("IP {} 登录失败 {} 次，已被封锁", req.ip_address, failed);
            let details = format!("locked out after {} failed attempts", failed);
            self.login_failed(req, &details).await;
            return Err(AuthError::LockedOut);
        }

        let account = match self.accounts.get_by_username(&req.username).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!("管理员 {} 不存在", req.username);
                self.login_failed(req, "user not found").await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                error!("查询管理员出错: {}", e);
                self.login_failed(req, "database error").await;
                return Err(e.into());
            }
        };

        let version = match HashVersion::try_from(account.hash_version) {
            Ok(version) => version,
            Err(e) => {
                error!("管理员 {} 的密码哈希版本无法识别: {}", account.id, e);
                self.login_failed(req, "unknown hash version").await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .verify_password(account.password_hash.clone(), req.password.clone(), version)
            .await
        {
            match &e {
                AuthError::LegacyHashFormat => {
                    warn!("管理员 {} 使用旧版密码格式", account.username);
                    self.login_failed(req, "legacy password format").await;
                }
                AuthError::InvalidCredentials => {
                    warn!("管理员 {} 密码错误", account.username);
                    self.login_failed(req, "invalid password").await;
                }
                other => {
                    error!("管理员 {} 密码验证出错: {}", account.username, other);
                    self.login_failed(req, "password verification error").await;
                }
            }
            return Err(e);
        }

        let tokens = match self.issuer.issue_pair(account.id, &account.username) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.login_failed(req, "failed to generate token").await;
                return Err(e);
            }
        };

        // 会话未落库则登录失败
        if let Err(e) = self
            .accounts
            .update_token(account.id, &tokens.refresh_token, tokens.refresh_expires_at)
            .await
        {
            error!("保存管理员 {} 的会话失败: {}", account.id, e);
            self.login_failed(req, "failed to persist session").await;
            return Err(e.into());
        }

        self.record_attempt(&req.ip_address, &req.user_agent, true, "login successful")
            .await;
        info!("管理员 {} 登录成功", account.username);

        Ok(LoginSuccess {
            tokens,
            admin: AuthenticatedAdmin {
                id: account.id,
                username: account.username,
            },
            last_login: account.last_login,
        })
    }

    // bcrypt 在阻塞线程池中执行，调用方被取消时计算仍会完成
    async fn verify_password(
        &self,
        stored_hash: String,
        password: String,
        version: HashVersion,
    ) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify_password(&stored_hash, &password, version))
            .await
            .map_err(|e| AuthError::Internal(format!("密码验证任务失败: {}", e)))?
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("密码加密任务失败: {}", e)))?
    }

    /// 认证受保护的请求：优先使用访问令牌，失效时用刷新令牌换发
    pub async fn authenticate(
        &self,
        credentials: &PresentedCredentials,
    ) -> Result<Authenticated, AuthError> {
        if let Some(token) = credentials.access_token.as_deref() {
            match self.issuer.validate_access(token) {
                Ok(claims) => {
                    // 令牌有效期内账号也可能已被删除
                    return match self.accounts.get_by_id(claims.user_id).await? {
                        Some(account) => {
                            debug!("管理员 {} 认证成功", account.username);
                            Ok(Authenticated {
                                admin: AuthenticatedAdmin {
                                    id: account.id,
                                    username: account.username,
                                },
                                rotated: None,
                            })
                        }
                        None => {
                            warn!("令牌对应的管理员 {} 已不存在", claims.user_id);
                            Err(AuthError::AccountNotFound)
                        }
                    };
                }
                Err(e) => debug!("访问令牌不可用，尝试刷新令牌: {}", e),
            }
        }

        match credentials.refresh_token.as_deref() {
            Some(refresh_token) => {
                let (tokens, account) = self.rotate(refresh_token).await?;
                Ok(Authenticated {
                    admin: AuthenticatedAdmin {
                        id: account.id,
                        username: account.username,
                    },
                    rotated: Some(tokens),
                })
            }
            None => {
                debug!("请求未携带可用凭证");
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// 用刷新令牌换发新的令牌对，旧刷新令牌随即失效
    pub async fn refresh(&self, refresh_token: &str) -> Result<(TokenPair, AuthenticatedAdmin), AuthError> {
        let (tokens, account) = self.rotate(refresh_token).await?;
        Ok((
            tokens,
            AuthenticatedAdmin {
                id: account.id,
                username: account.username,
            },
        ))
    }

    async fn rotate(&self, refresh_token: &str) -> Result<(TokenPair, Account), AuthError> {
        let claims = self.issuer.validate_refresh(refresh_token).map_err(|e| {
            warn!("刷新令牌无效: {}", e);
            AuthError::Unauthenticated
        })?;

        let account = match self.accounts.get_by_token(refresh_token).await? {
            Some(account) if account.id == claims.user_id => account,
            _ => {
                warn!("管理员 {} 的刷新令牌已被撤销", claims.user_id);
                return Err(AuthError::Revoked);
            }
        };

        let tokens = self.issuer.issue_pair(account.id, &account.username)?;
        let swapped = self
            .accounts
            .rotate_token(
                account.id,
                refresh_token,
                &tokens.refresh_token,
                tokens.refresh_expires_at,
            )
            .await?;

        if !swapped {
            // 并发刷新中的失败方
            warn!("管理员 {} 的刷新令牌已被其他请求轮换", account.id);
            return Err(AuthError::Revoked);
        }

        info!("管理员 {} 的令牌已轮换", account.username);
        Ok((tokens, account))
    }

    pub async fn logout(&self, account_id: AccountId) -> Result<(), AuthError> {
        self.accounts.invalidate_token(account_id).await?;
        info!("管理员 {} 已登出", account_id);
        Ok(())
    }

    /// 没有任何管理员时创建默认管理员
    pub async fn ensure_admin(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Option<Account>, AuthError> {
        let count = self.accounts.count().await?;
        if count > 0 {
            info!("系统中已有 {} 个管理员", count);
            return Ok(None);
        }

        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                return Err(AuthError::Internal(
                    "未找到管理员，且未设置 ADMIN_USER 和 ADMIN_PASSWORD".to_string(),
                ))
            }
        };

        info!("未找到管理员，创建默认管理员 {}", username);
        let password_hash = self.hash_password(password.to_string()).await?;
        let account = self
            .accounts
            .create(NewAccount {
                username: username.to_string(),
                password_hash,
                hash_version: HashVersion::CURRENT.as_i32(),
                password_salt: None,
            })
            .await?;

        info!("默认管理员创建成功 - ID: {}, 用户名: {}", account.id, account.username);
        Ok(Some(account))
    }

    /// 清理过期令牌和旧的登录记录，失败只记日志
    pub async fn run_maintenance(&self) {
        debug!("执行会话维护任务");
        match self.accounts.cleanup_expired().await {
            Ok(n) if n > 0 => info!("清理了 {} 个过期的会话令牌", n),
            Ok(_) => {}
            Err(e) => error!("维护任务: 清理过期令牌失败: {}", e),
        }

        let cutoff = Utc::now() - self.attempt_retention;
        if let Err(e) = self.attempts.cleanup_older_than(cutoff).await {
            error!("维护任务: 清理旧登录记录失败: {}", e);
        }
    }

    /// 等待后台登录记录写入完成
    pub async fn shutdown(&self) {
        self.recorder.drain().await;
    }
}
