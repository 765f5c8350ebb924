use actix_web::{web, HttpResponse};
use log::error;
use serde_json::json;
use sqlx::PgPool;

use super::ApiResponse;

/// 检查数据库连接
pub async fn health(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::ok(
            "服务正常",
            Some(json!({ "status": "healthy" })),
        )),
        Err(e) => {
            error!("健康检查失败: {}", e);
            HttpResponse::ServiceUnavailable().json(ApiResponse {
                success: false,
                message: "数据库不可用".to_string(),
                data: Some(json!({ "status": "unhealthy" })),
            })
        }
    }
}
