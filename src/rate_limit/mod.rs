//! Rate limiting module
//!
//! Per-request admission control with a fixed one-second counting window and
//! a separate, longer penalty block once a limit is exceeded:
//!
//! - **Counter stores**: an in-memory store and a Redis-backed store behind
//!   the same [`CounterStore`] trait
//! - **Decision engine**: [`RateLimiter`], which counts a request against
//!   its credential if it has one and its address otherwise
//! - **Admission filter**: an axum middleware turning verdicts into `429`
//!   responses
//!
//! # Example
//!
//! ```rust,no_run
//! use ratelimiter::rate_limit::{Identity, LimiterConfig, MemoryStore, RateLimiter, Verdict};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LimiterConfig {
//!         ip_limit: 5,
//!         ip_block_duration: Duration::from_secs(300),
//!         token_limit: 10,
//!         token_block_duration: Duration::from_secs(300),
//!     };
//!
//!     let limiter = RateLimiter::new(config, Arc::new(MemoryStore::new()));
//!     let verdict = limiter.allow(&Identity::from_address("10.0.0.1")).await.unwrap();
//!     assert_eq!(verdict, Verdict::Permit);
//! }
//! ```

pub mod limiter;
pub mod lua_scripts;
pub mod memory;
pub mod middleware;
pub mod redis;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use limiter::RateLimiter;
pub use memory::MemoryStore;
pub use middleware::{client_ip, rate_limit_middleware, AdmissionFilter};
pub use redis::RedisStore;
pub use store::{connect, CounterStore};
pub use types::{Identity, LimitKind, LimiterConfig, RateLimitKey, Verdict};
