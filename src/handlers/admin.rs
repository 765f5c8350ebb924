use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder, ResponseError};
use log::{info, warn};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use validator::Validate;

use super::ApiResponse;
use crate::auth::cookies::{client_ip, extract_credentials, user_agent};
use crate::auth::{
    AuthError, AuthMiddleware, AuthenticatedAdmin, CookiePolicy, LoginRequest, SessionManager,
};
use crate::ratelimit::{RateLimitExceeded, RateLimiter};
use crate::store::{AccountStore, LoginAttemptStore};

/// 管理接口共享的状态
pub struct AdminState<A, L> {
    pub sessions: Arc<SessionManager<A, L>>,
    pub cookies: CookiePolicy,
    pub login_limiter: RateLimiter,
    pub refresh_limiter: RateLimiter,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

fn username_pattern() -> &'static Result<Regex, regex::Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$"))
}

impl LoginPayload {
    fn is_acceptable(&self) -> bool {
        if self.validate().is_err() {
            return false;
        }
        match username_pattern() {
            Ok(re) => re.is_match(&self.username),
            Err(_) => false,
        }
    }
}

/// 注册管理接口，`logout` 和 `me` 需要认证
pub fn configure<A, L>(state: web::Data<AdminState<A, L>>) -> impl FnOnce(&mut web::ServiceConfig)
where
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    move |cfg: &mut web::ServiceConfig| {
        let guard = AuthMiddleware::new(state.sessions.clone(), state.cookies);
        cfg.app_data(state)
            .route("/login", web::post().to(login::<A, L>))
            .route("/refresh", web::post().to(refresh::<A, L>))
            .service(
                web::resource("/logout")
                    .wrap(guard.clone())
                    .route(web::post().to(logout::<A, L>)),
            )
            .service(
                web::resource("/me")
                    .wrap(guard)
                    .route(web::get().to(me)),
            );
    }
}

fn too_many_requests(e: &RateLimitExceeded) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header((header::RETRY_AFTER, e.retry_after_secs.to_string()))
        .json(ApiResponse::fail(&e.to_string()))
}

fn with_cookies(mut builder: HttpResponseBuilder, cookies: [Cookie<'static>; 2]) -> HttpResponseBuilder {
    for cookie in cookies {
        builder.cookie(cookie);
    }
    builder
}

fn auth_failure(e: &AuthError, cookies: &CookiePolicy) -> HttpResponse {
    let mut response = e.error_response();
    if e.clears_session() {
        for cookie in cookies.cleared_cookies() {
            if let Err(err) = response.add_cookie(&cookie) {
                warn!("清除会话 cookie 失败: {}", err);
            }
        }
    }
    response
}

pub async fn login<A, L>(
    req: HttpRequest,
    state: web::Data<AdminState<A, L>>,
    payload: Result<web::Json<LoginPayload>, actix_web::Error>,
) -> HttpResponse
where
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    let ip = client_ip(&req);
    let ua = user_agent(&req);

    if let Err(e) = state.login_limiter.check(&format!("login:{}", ip)) {
        return too_many_requests(&e);
    }

    // 无法解析的请求体同样计入失败次数
    let payload = match payload {
        Ok(payload) => payload.into_inner(),
        Err(e) => {
            warn!("登录请求格式错误 - IP: {}", ip);
            state
                .sessions
                .note_failed_attempt(&ip, &ua, "invalid request format")
                .await;
            return e.error_response();
        }
    };
    if !payload.is_acceptable() {
        warn!("登录参数校验失败 - IP: {}", ip);
        state
            .sessions
            .note_failed_attempt(&ip, &ua, "invalid input")
            .await;
        return HttpResponse::BadRequest().json(ApiResponse::fail("用户名或密码格式不正确"));
    }

    let request = LoginRequest {
        username: payload.username,
        password: payload.password,
        ip_address: ip,
        user_agent: ua,
    };

    match state.sessions.login(&request).await {
        Ok(success) => {
            let body = ApiResponse::ok(
                "登录成功",
                Some(json!({
                    "user": {
                        "id": success.admin.id,
                        "username": success.admin.username,
                        "last_login": success.last_login,
                    },
                    "expires_at": success.tokens.access_expires_at,
                })),
            );
            with_cookies(HttpResponse::Ok(), state.cookies.session_cookies(&success.tokens))
                .json(body)
        }
        Err(e) => e.error_response(),
    }
}

pub async fn refresh<A, L>(req: HttpRequest, state: web::Data<AdminState<A, L>>) -> HttpResponse
where
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    let ip = client_ip(&req);
    if let Err(e) = state.refresh_limiter.check(&format!("refresh:{}", ip)) {
        return too_many_requests(&e);
    }

    let refresh_token = match extract_credentials(&req).refresh_token {
        Some(token) => token,
        None => return auth_failure(&AuthError::Unauthenticated, &state.cookies),
    };

    match state.sessions.refresh(&refresh_token).await {
        Ok((tokens, admin)) => {
            info!("管理员 {} 刷新令牌成功", admin.username);
            let body = ApiResponse::ok(
                "令牌刷新成功",
                Some(json!({
                    "user": admin,
                    "expires_at": tokens.access_expires_at,
                })),
            );
            with_cookies(HttpResponse::Ok(), state.cookies.session_cookies(&tokens)).json(body)
        }
        Err(e) => auth_failure(&e, &state.cookies),
    }
}

pub async fn logout<A, L>(
    admin: web::ReqData<AuthenticatedAdmin>,
    state: web::Data<AdminState<A, L>>,
) -> HttpResponse
where
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    match state.sessions.logout(admin.id).await {
        Ok(()) => with_cookies(HttpResponse::Ok(), state.cookies.cleared_cookies())
            .json(ApiResponse::ok("已登出", None)),
        Err(e) => e.error_response(),
    }
}

pub async fn me(admin: web::ReqData<AuthenticatedAdmin>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(
        "获取管理员信息成功",
        Some(json!({ "user": admin.into_inner() })),
    ))
}
