use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{debug, warn};
use std::rc::Rc;
use std::sync::Arc;

use super::cookies::{extract_credentials, CookiePolicy, ACCESS_COOKIE, REFRESH_COOKIE};
use super::manager::SessionManager;
use crate::store::{AccountStore, LoginAttemptStore};

/// 保护管理接口：认证通过后把 `AuthenticatedAdmin` 放入请求扩展
pub struct AuthMiddleware<A, L> {
    sessions: Arc<SessionManager<A, L>>,
    cookies: CookiePolicy,
}

impl<A, L> AuthMiddleware<A, L> {
    pub fn new(sessions: Arc<SessionManager<A, L>>, cookies: CookiePolicy) -> Self {
        Self { sessions, cookies }
    }
}

impl<A, L> Clone for AuthMiddleware<A, L> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            cookies: self.cookies,
        }
    }
}

impl<S, B, A, L> Transform<S, ServiceRequest> for AuthMiddleware<A, L>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S, A, L>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            sessions: self.sessions.clone(),
            cookies: self.cookies,
        }))
    }
}

pub struct AuthMiddlewareService<S, A, L> {
    service: Rc<S>,
    sessions: Arc<SessionManager<A, L>>,
    cookies: CookiePolicy,
}

impl<S, B, A, L> Service<ServiceRequest> for AuthMiddlewareService<S, A, L>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    A: AccountStore + 'static,
    L: LoginAttemptStore + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let sessions = self.sessions.clone();
        let service = self.service.clone();
        let cookies = self.cookies;

        Box::pin(async move {
            let credentials = extract_credentials(req.request());

            match sessions.authenticate(&credentials).await {
                Ok(authenticated) => {
                    debug!("管理员 {} 通过认证", authenticated.admin.username);
                    req.extensions_mut().insert(authenticated.admin);

                    let mut res = service.call(req).await?;
                    // 会话被轮换时下发新的 cookie，处理器自己设置了会话 cookie（如登出）时以处理器为准
                    let handler_set_session = res
                        .response()
                        .cookies()
                        .any(|c| c.name() == ACCESS_COOKIE || c.name() == REFRESH_COOKIE);
                    if let Some(tokens) = authenticated.rotated.filter(|_| !handler_set_session) {
                        for cookie in cookies.session_cookies(&tokens) {
                            if let Err(e) = res.response_mut().add_cookie(&cookie) {
                                warn!("设置会话 cookie 失败: {}", e);
                            }
                        }
                    }
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    warn!("请求认证失败 ({}): {}", req.path(), e);
                    let mut response = e.error_response();
                    if e.clears_session() {
                        for cookie in cookies.cleared_cookies() {
                            if let Err(err) = response.add_cookie(&cookie) {
                                warn!("清除会话 cookie 失败: {}", err);
                            }
                        }
                    }
                    Ok(req.into_response(response.map_into_right_body()))
                }
            }
        })
    }
}
