use chrono::Duration;
use log::{info, warn};
use std::env;
use std::str::FromStr;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-jwt-secret-change-this-in-production";
const DEV_PASSWORD_PEPPER: &str = "dev-pepper-change-this-in-production";
const DEV_ADMIN_PATH_TOKEN: &str = "admin-dev";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少必需的环境变量: {0}")]
    Missing(&'static str),

    #[error("环境变量 {key} 的值无效: {value}")]
    Invalid { key: &'static str, value: String },
}

/// 登录封锁策略
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i64,
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            window: Duration::minutes(5),
        }
    }
}

/// 进程级密钥与令牌有效期，启动时读取一次
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub password_pepper: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub lockout: LockoutPolicy,
    pub attempt_retention: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub period_secs: u64,
}

/// 响应安全头与请求体大小限制
#[derive(Debug, Clone, Copy)]
pub struct SecurityConfig {
    pub headers_enabled: bool,
    pub hsts_max_age: u64,
    pub max_request_body_size: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub port: u16,
    pub production: bool,
    pub https_mode: bool,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub admin_path_token: String,
    pub allowed_origins: Vec<String>,
    pub maintenance_interval: std::time::Duration,
    pub login_rate_limit: RateLimitConfig,
    pub refresh_rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
}

/// 日志设置，先于其他配置读取
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub dir: String,
    pub level: log::LevelFilter,
}

impl LogSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let level = match get("LOG_LEVEL") {
            Some(level) => level.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "LOG_LEVEL",
                value: level,
            })?,
            None => log::LevelFilter::Info,
        };
        Ok(Self {
            dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            level,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let production = get("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                warn!("未设置 JWT_SECRET，使用开发环境默认密钥");
                DEV_JWT_SECRET.to_string()
            }
        };

        let password_pepper = match get("PASSWORD_PEPPER") {
            Some(pepper) => pepper,
            None if production => return Err(ConfigError::Missing("PASSWORD_PEPPER")),
            None => {
                warn!("未设置 PASSWORD_PEPPER，使用开发环境默认值");
                DEV_PASSWORD_PEPPER.to_string()
            }
        };

        let admin_path_token = match get("ADMIN_PATH_TOKEN") {
            Some(token) => token,
            None if production => return Err(ConfigError::Missing("ADMIN_PATH_TOKEN")),
            None => DEV_ADMIN_PATH_TOKEN.to_string(),
        };

        let access_minutes: i64 = parse_or(&get, "ACCESS_TOKEN_TTL_MINUTES", 60)?;
        let refresh_days: i64 = parse_or(&get, "REFRESH_TOKEN_TTL_DAYS", 7)?;
        let max_failed_attempts: i64 = parse_or(&get, "MAX_FAILED_ATTEMPTS", 5)?;
        let window_minutes: i64 = parse_or(&get, "LOCKOUT_WINDOW_MINUTES", 5)?;
        let retention_days: i64 = parse_or(&get, "LOGIN_ATTEMPT_RETENTION_DAYS", 7)?;
        let interval_minutes: u64 = parse_or(&get, "MAINTENANCE_INTERVAL_MINUTES", 60)?;

        for (key, value) in [
            ("ACCESS_TOKEN_TTL_MINUTES", access_minutes),
            ("REFRESH_TOKEN_TTL_DAYS", refresh_days),
            ("MAX_FAILED_ATTEMPTS", max_failed_attempts),
            ("LOCKOUT_WINDOW_MINUTES", window_minutes),
            ("LOGIN_ATTEMPT_RETENTION_DAYS", retention_days),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }
        let max_request_body_size: usize = parse_or(&get, "MAX_REQUEST_BODY_SIZE", 1 << 20)?;
        if max_request_body_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_REQUEST_BODY_SIZE",
                value: "0".to_string(),
            });
        }
        if interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "MAINTENANCE_INTERVAL_MINUTES",
                value: "0".to_string(),
            });
        }

        let mut allowed_origins = vec!["http://localhost".to_string()];
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            allowed_origins.extend(
                origins
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty() && o != "http://localhost"),
            );
        }

        let config = AppConfig {
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
            production,
            https_mode: parse_or(&get, "HTTPS_MODE", false)?,
            admin_user: get("ADMIN_USER"),
            admin_password: get("ADMIN_PASSWORD"),
            admin_path_token,
            allowed_origins,
            maintenance_interval: std::time::Duration::from_secs(interval_minutes * 60),
            login_rate_limit: RateLimitConfig {
                requests: parse_or(&get, "RATE_LIMIT_LOGIN_REQUESTS", 5)?,
                period_secs: parse_or(&get, "RATE_LIMIT_LOGIN_PERIOD_SECS", 60)?,
            },
            refresh_rate_limit: RateLimitConfig {
                requests: parse_or(&get, "RATE_LIMIT_REFRESH_REQUESTS", 10)?,
                period_secs: parse_or(&get, "RATE_LIMIT_REFRESH_PERIOD_SECS", 60)?,
            },
            security: SecurityConfig {
                headers_enabled: parse_or(&get, "SECURITY_HEADERS_ENABLED", true)?,
                hsts_max_age: parse_or(&get, "HSTS_MAX_AGE", 31_536_000)?,
                max_request_body_size,
            },
            auth: AuthConfig {
                jwt_secret,
                password_pepper,
                access_token_ttl: Duration::minutes(access_minutes),
                refresh_token_ttl: Duration::days(refresh_days),
                lockout: LockoutPolicy {
                    max_failed_attempts,
                    window: Duration::minutes(window_minutes),
                },
                attempt_retention: Duration::days(retention_days),
            },
        };

        info!(
            "配置加载完成 - 监听 {}:{}, HTTPS: {}, 生产环境: {}",
            config.bind_addr, config.port, config.https_mode, config.production
        );
        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => Err(ConfigError::Invalid { key, value: raw }),
        },
        None => Ok(default),
    }
}
