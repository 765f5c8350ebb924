use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::handlers::ApiResponse;
use crate::store::StoreError;

/// 令牌校验失败的原因
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("令牌已过期")]
    Expired,

    #[error("令牌签名无效")]
    SignatureInvalid,

    #[error("令牌格式错误")]
    Malformed,

    #[error("令牌尚未生效")]
    NotYetValid,

    #[error("令牌类型错误: 期望 {expected}")]
    WrongTokenType { expected: super::TokenType },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("用户名或密码错误")]
    InvalidCredentials,

    #[error("旧版密码格式已不再支持")]
    LegacyHashFormat,

    #[error("登录失败次数过多")]
    LockedOut,

    #[error("未认证")]
    Unauthenticated,

    #[error("会话已被撤销")]
    Revoked,

    #[error("账号不存在")]
    AccountNotFound,

    #[error("未知的密码哈希版本: {0}")]
    UnknownHashVersion(i32),

    #[error("存储错误: {0}")]
    Persistence(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Persistence(e.to_string())
    }
}

impl AuthError {
    /// 返回给客户端的消息，不包含内部细节
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "用户名或密码错误",
            AuthError::LegacyHashFormat => "密码格式需要更新，请重置密码",
            AuthError::LockedOut => "登录失败次数过多，请稍后再试",
            AuthError::Unauthenticated => "登录已失效，请重新登录",
            AuthError::Revoked => "会话已被撤销，请重新登录",
            AuthError::AccountNotFound => "账号不存在",
            AuthError::UnknownHashVersion(_) | AuthError::Persistence(_) | AuthError::Internal(_) => {
                "服务器内部错误"
            }
        }
    }

    /// 是否需要清除客户端的会话 cookie
    pub fn clears_session(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthenticated | AuthError::Revoked | AuthError::AccountNotFound
        )
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::LegacyHashFormat
            | AuthError::Unauthenticated
            | AuthError::Revoked
            | AuthError::AccountNotFound => StatusCode::UNAUTHORIZED,
            AuthError::LockedOut => StatusCode::TOO_MANY_REQUESTS,
            AuthError::UnknownHashVersion(_) | AuthError::Persistence(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse {
            success: false,
            message: self.client_message().to_string(),
            data: None,
        })
    }
}
