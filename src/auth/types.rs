use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::AuthError;
use crate::store::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // account id
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    pub user_id: AccountId,
    pub username: String,
    pub token_type: TokenType,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// 密码哈希版本，对应 admins.hash_version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashVersion {
    /// 固定盐 + SHA-256 + bcrypt，仅用于识别旧密码并提示重置
    Legacy,
    /// 每个哈希自带随机盐的 bcrypt
    BcryptDirect,
}

impl HashVersion {
    pub const CURRENT: HashVersion = HashVersion::BcryptDirect;

    pub fn as_i32(self) -> i32 {
        match self {
            HashVersion::Legacy => 1,
            HashVersion::BcryptDirect => 2,
        }
    }
}

impl TryFrom<i32> for HashVersion {
    type Error = AuthError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HashVersion::Legacy),
            2 => Ok(HashVersion::BcryptDirect),
            other => Err(AuthError::UnknownHashVersion(other)),
        }
    }
}

/// 通过认证的管理员，放入请求扩展中
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedAdmin {
    pub id: AccountId,
    pub username: String,
}

/// 请求中携带的凭证
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresentedCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// 请求认证的结果，`rotated` 表示本次请求通过刷新令牌换发了新令牌
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub admin: AuthenticatedAdmin,
    pub rotated: Option<TokenPair>,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub ip_address: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub tokens: TokenPair,
    pub admin: AuthenticatedAdmin,
    /// 本次登录之前的最后登录时间
    pub last_login: Option<DateTime<Utc>>,
}
