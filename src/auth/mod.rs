pub mod cookies;
pub mod error;
pub mod hasher;
pub mod jwt;
pub mod manager;
pub mod middleware;
pub mod recorder;
pub mod types;

pub use cookies::CookiePolicy;
pub use error::AuthError;
pub use manager::SessionManager;
pub use middleware::AuthMiddleware;
pub use types::{AuthenticatedAdmin, LoginRequest, TokenType};
