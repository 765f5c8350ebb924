use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use chrono::{DateTime, Utc};

use super::types::{PresentedCredentials, TokenPair};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// 会话 cookie 的属性
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn build(&self, name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure)
            .max_age(CookieDuration::seconds(max_age_secs))
            .finish()
    }

    fn lifetime(expires_at: DateTime<Utc>) -> i64 {
        (expires_at - Utc::now()).num_seconds().max(0)
    }

    /// 登录或刷新成功后下发的两个 cookie
    pub fn session_cookies(&self, tokens: &TokenPair) -> [Cookie<'static>; 2] {
        [
            self.build(
                ACCESS_COOKIE,
                tokens.access_token.clone(),
                Self::lifetime(tokens.access_expires_at),
            ),
            self.build(
                REFRESH_COOKIE,
                tokens.refresh_token.clone(),
                Self::lifetime(tokens.refresh_expires_at),
            ),
        ]
    }

    /// 立即过期的同名 cookie，用于清除客户端会话
    pub fn cleared_cookies(&self) -> [Cookie<'static>; 2] {
        [
            self.build(ACCESS_COOKIE, String::new(), 0),
            self.build(REFRESH_COOKIE, String::new(), 0),
        ]
    }
}

/// 访问令牌优先取 cookie，其次取 Bearer 头；刷新令牌只取 cookie
pub fn extract_credentials(req: &HttpRequest) -> PresentedCredentials {
    let access_token = req
        .cookie(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        });

    let refresh_token = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    PresentedCredentials {
        access_token,
        refresh_token,
    }
}

pub fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

pub fn user_agent(req: &HttpRequest) -> String {
    req.headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
