//! # forgepool
//!
//! A bounded async worker pool with priority dispatch, per-attempt
//! timeouts, and retries.
//!
//! ## Features
//!
//! - **Priority dispatch**: three tiers, FIFO within a tier
//! - **Per-attempt timeouts**: a stuck attempt frees its worker and retries
//! - **Retry budgets**: a task with `retries = N` runs at most `N + 1` times
//! - **Clean termination**: every outstanding submission settles, none hang
//! - **Opaque workers**: actors reached only by message passing
//!
//! ## Quick Start
//!
//! ```rust
//! use forgepool::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> PoolResult<()> {
//!     let registry = HandlerRegistry::new().with(FnHandler::new(
//!         "resize",
//!         |task| async move { Ok(json!({ "resized": task.payload })) },
//!     ));
//!
//!     let pool = TaskPool::new(PoolConfig::default(), registry)?;
//!
//!     let outcome = pool
//!         .submit(
//!             TaskSpec::new("resize", json!({"width": 800}))
//!                 .with_priority(TaskPriority::High)
//!                 .with_retries(2),
//!         )
//!         .await?;
//!     assert!(outcome.success);
//!
//!     println!("completed: {}", pool.stats().completed_tasks);
//!     pool.terminate().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod queue;
pub mod stats;
pub mod task;

pub mod prelude {
    pub use crate::config::{LogLevel, LoggingConfig, PoolConfig, WorkerConfig};
    pub use crate::core::TaskPool;
    pub use crate::core::registry::{FnHandler, HandlerRegistry, TaskHandler};
    pub use crate::core::scale::{LoadSnapshot, ScalePolicy};
    pub use crate::error::{PoolError, PoolResult};
    pub use crate::stats::PoolStats;
    pub use crate::task::{TaskId, TaskOutcome, TaskPriority, TaskSpec};
    pub use async_trait::async_trait;
}

pub use crate::config::{PoolConfig, WorkerConfig};
pub use crate::core::TaskPool;
pub use crate::core::registry::{FnHandler, HandlerRegistry, TaskHandler};
pub use crate::error::{PoolError, PoolResult};
pub use crate::stats::PoolStats;
pub use crate::task::{TaskId, TaskOutcome, TaskPriority, TaskSpec};
pub use async_trait::async_trait;
