mod manager;
mod types;

pub use manager::RateLimiter;
pub use types::RateLimitExceeded;
