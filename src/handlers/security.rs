use actix_web::{web, HttpRequest, HttpResponse};
use log::warn;
use serde::Deserialize;
use serde_json::json;

use super::ApiResponse;
use crate::auth::cookies::client_ip;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CspViolation {
    pub document_uri: String,
    pub referrer: String,
    pub violated_directive: String,
    pub effective_directive: String,
    pub original_policy: String,
    pub disposition: String,
    pub blocked_uri: String,
    pub line_number: u32,
    pub column_number: u32,
    pub source_file: String,
    pub status_code: u16,
    pub script_sample: String,
}

#[derive(Debug, Deserialize)]
pub struct CspReport {
    #[serde(rename = "csp-report", default)]
    pub report: CspViolation,
}

/// 浏览器以 application/csp-report 提交，按原始字节解析
pub async fn csp_report(req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let report: CspReport = match serde_json::from_slice(&body) {
        Ok(report) => report,
        Err(e) => {
            warn!("CSP 报告格式错误 (IP: {}): {}", client_ip(&req), e);
            return HttpResponse::BadRequest().json(ApiResponse::fail("请求格式错误"));
        }
    };

    let v = &report.report;
    warn!(
        "CSP 违规报告: 页面={}, 指令={}, 被拦截={}, 来源={}:{}:{}",
        v.document_uri,
        v.violated_directive,
        v.blocked_uri,
        v.source_file,
        v.line_number,
        v.column_number
    );

    HttpResponse::Ok().json(ApiResponse::ok(
        "已收到",
        Some(json!({ "status": "received" })),
    ))
}
