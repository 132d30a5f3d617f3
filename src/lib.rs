pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod rate;
pub mod rate_limiter;
pub mod replication;
pub mod response;
pub mod server;
pub mod store;

pub use config::{Config, LimitRule};
pub use engine::Verdict;
pub use error::{LimitError, LimitResult};
pub use rate_limiter::RateLimiter;
pub use server::create_app;
pub use store::{RedisStore, StoreClient};
