use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, HttpResponse};
use log::warn;
use serde::Serialize;
use serde_json::Value;

pub mod admin;
pub mod health;
pub mod security;

pub use admin::AdminState;

// 统一的 JSON 响应结构
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok(message: &str, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data,
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            data: None,
        }
    }
}

/// JSON 请求体的大小上限，解析失败时返回统一的响应结构
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, req| {
            warn!("请求格式错误 ({}): {}", req.path(), err);
            let response = match &err {
                JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
                    HttpResponse::PayloadTooLarge().json(ApiResponse::fail("请求体过大"))
                }
                _ => HttpResponse::BadRequest().json(ApiResponse::fail("请求格式错误")),
            };
            InternalError::from_response(err, response).into()
        })
}

pub async fn test_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok("Hello from portfolio-api", None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};

    async fn echo(body: web::Json<Value>) -> HttpResponse {
        HttpResponse::Ok().json(body.into_inner())
    }

    #[actix_web::test]
    async fn malformed_and_oversized_json_get_the_envelope() {
        let app = test::init_service(
            App::new()
                .app_data(json_config(32))
                .route("/echo", web::post().to(echo)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/echo")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "请求格式错误");

        let req = test::TestRequest::post()
            .uri("/echo")
            .set_json(serde_json::json!({ "padding": "x".repeat(64) }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "请求体过大");
    }
}
