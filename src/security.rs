use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;

use crate::config::SecurityConfig;

/// CSP 违规报告的接收地址
pub const CSP_REPORT_PATH: &str = "/api/csp-report";

/// 生成内容安全策略，开发环境放宽脚本、图片和 websocket 来源
pub fn csp_policy(production: bool) -> String {
    let (script, img, font, connect) = if production {
        (
            "'self' 'unsafe-inline'",
            "'self' data: https:",
            "'self' https:",
            "'self'",
        )
    } else {
        (
            "'self' 'unsafe-inline' 'unsafe-eval'",
            "'self' data: https: http:",
            "'self' https: http:",
            "'self' ws: wss:",
        )
    };

    format!(
        "default-src 'self'; script-src {}; style-src 'self' 'unsafe-inline'; img-src {}; \
         font-src {}; connect-src {}; media-src 'self'; object-src 'none'; base-uri 'self'; \
         form-action 'self'; frame-ancestors 'none'; report-uri {}",
        script, img, font, connect, CSP_REPORT_PATH
    )
}

/// 所有响应默认附带的安全头，HSTS 只在 HTTPS 模式下发送
pub fn security_headers(config: &SecurityConfig, https_mode: bool, production: bool) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .add((header::X_FRAME_OPTIONS, "DENY"))
        .add((header::X_XSS_PROTECTION, "1; mode=block"))
        .add((header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
        .add((
            "Permissions-Policy",
            "camera=(), microphone=(), geolocation=(), payment=()",
        ))
        .add(("Cross-Origin-Embedder-Policy", "require-corp"))
        .add(("Cross-Origin-Opener-Policy", "same-origin"))
        .add((header::CONTENT_SECURITY_POLICY, csp_policy(production)));

    if https_mode {
        headers = headers.add((
            header::STRICT_TRANSPORT_SECURITY,
            format!("max-age={}; includeSubDomains", config.hsts_max_age),
        ));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    fn settings() -> SecurityConfig {
        SecurityConfig {
            headers_enabled: true,
            hsts_max_age: 600,
            max_request_body_size: 1024,
        }
    }

    #[::core::prelude::v1::test]
    fn development_policy_allows_eval_and_websockets() {
        let dev = csp_policy(false);
        assert!(dev.contains("'unsafe-eval'"));
        assert!(dev.contains("connect-src 'self' ws: wss:"));

        let prod = csp_policy(true);
        assert!(!prod.contains("'unsafe-eval'"));
        assert!(prod.contains("frame-ancestors 'none'"));
        assert!(prod.ends_with("report-uri /api/csp-report"));
    }

    #[actix_web::test]
    async fn responses_carry_security_headers() {
        let app = test::init_service(
            App::new()
                .wrap(security_headers(&settings(), false, true))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let headers = res.headers();
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(
            headers.get(header::CONTENT_SECURITY_POLICY).unwrap().to_str().unwrap(),
            csp_policy(true)
        );
        assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[actix_web::test]
    async fn hsts_is_sent_in_https_mode() {
        let app = test::init_service(
            App::new()
                .wrap(security_headers(&settings(), true, true))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(
            res.headers().get(header::STRICT_TRANSPORT_SECURITY).unwrap(),
            "max-age=600; includeSubDomains"
        );
    }
}
