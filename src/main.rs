mod auth;
mod config;
mod db;
mod handlers;
mod logger;
mod maintenance;
mod ratelimit;
mod security;
mod store;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Condition, web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use auth::{CookiePolicy, SessionManager};
use config::{AppConfig, LogSettings};
use handlers::AdminState;
use ratelimit::RateLimiter;
use store::{PostgresAccountStore, PostgresLoginAttemptStore};

// 限流窗口的清理周期
const LIMITER_CLEANUP_PERIOD: Duration = Duration::from_secs(300);

fn startup_error<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> io::Error + '_ {
    move |e| io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // 加载 .env
    dotenv().ok();

    let log_settings = LogSettings::from_env().map_err(startup_error("日志配置错误"))?;
    logger::init(&log_settings.dir, log_settings.level);
    info!("应用程序启动");

    let config = AppConfig::from_env().map_err(startup_error("配置错误"))?;

    // 连接数据库
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(startup_error("数据库连接错误"))?;

    db::initialize_db(pool.clone())
        .await
        .map_err(startup_error("数据库初始化错误"))?;

    let sessions = Arc::new(SessionManager::new(
        Arc::new(PostgresAccountStore::new(pool.clone())),
        Arc::new(PostgresLoginAttemptStore::new(pool.clone())),
        &config.auth,
    ));

    sessions
        .ensure_admin(config.admin_user.as_deref(), config.admin_password.as_deref())
        .await
        .map_err(startup_error("管理员初始化错误"))?;

    // 启动时先清理一次
    sessions.run_maintenance().await;

    let login_limiter = RateLimiter::new("login", &config.login_rate_limit);
    let refresh_limiter = RateLimiter::new("refresh", &config.refresh_rate_limit);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let maintenance_sessions = sessions.clone();
    let maintenance_job = maintenance::spawn_periodic(
        "session-maintenance",
        config.maintenance_interval,
        shutdown_rx.clone(),
        move || {
            let sessions = maintenance_sessions.clone();
            async move { sessions.run_maintenance().await }
        },
    );

    let limiters = [login_limiter.clone(), refresh_limiter.clone()];
    let limiter_job = maintenance::spawn_periodic(
        "rate-limit-cleanup",
        LIMITER_CLEANUP_PERIOD,
        shutdown_rx,
        move || {
            let limiters = limiters.clone();
            async move {
                for limiter in &limiters {
                    limiter.cleanup_stale();
                }
            }
        },
    );

    let admin_state = web::Data::new(AdminState {
        sessions: sessions.clone(),
        cookies: CookiePolicy::new(config.https_mode),
        login_limiter,
        refresh_limiter,
    });
    let pool_data = web::Data::new(pool);
    let admin_path = format!("/api/{}/admin", config.admin_path_token);
    let allowed_origins = config.allowed_origins.clone();
    let security_config = config.security;
    let https_mode = config.https_mode;
    let production = config.production;

    info!("服务器启动在 http://{}:{}", config.bind_addr, config.port);

    let server = HttpServer::new(move || {
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(pool_data.clone())
            .app_data(handlers::json_config(security_config.max_request_body_size))
            .app_data(web::PayloadConfig::new(security_config.max_request_body_size))
            .wrap(cors)
            .wrap(Condition::new(
                security_config.headers_enabled,
                security::security_headers(&security_config, https_mode, production),
            ))
            .route("/api/health", web::get().to(handlers::health::health))
            .route("/api/test", web::get().to(handlers::test_endpoint))
            .route(
                security::CSP_REPORT_PATH,
                web::post().to(handlers::security::csp_report),
            )
            .service(web::scope(&admin_path).configure(handlers::admin::configure(admin_state.clone())))
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run();

    let result = server.await;
    if let Err(e) = &result {
        error!("服务器异常退出: {}", e);
    }

    info!("正在停止后台任务");
    let _ = shutdown_tx.send(true);
    for job in [maintenance_job, limiter_job] {
        if let Err(e) = job.await {
            error!("后台任务退出异常: {}", e);
        }
    }
    sessions.shutdown().await;
    info!("应用程序已停止");

    result
}
