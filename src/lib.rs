//! taskpool
//!
//! In-memory registry for background tasks submitted by a long-running
//! server. Each submitted unit of work gets a stable [`TaskId`], runs on a
//! bounded [`WorkerPool`] off the request path, and stays queryable while it
//! runs and for a while after it finishes.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use taskpool::{TaskRegistry, Result};
//!
//! fn main() -> Result<()> {
//!     let registry: TaskRegistry<String> = TaskRegistry::new();
//!     let task = registry.submit(
//!         || -> Result<()> {
//!             // bulk load, index rebuild, ...
//!             Ok(())
//!         },
//!         "backup",
//!         "dataset-a".to_string(),
//!         None,
//!     )?;
//!
//!     task.wait(Duration::from_secs(60));
//!     println!("{}", serde_json::to_string_pretty(&registry.summaries())?);
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::pool::{PoolError, PoolSettings, PoolStats, WorkerPool};
pub use runtime::registry::{
    RegistryError, Task, TaskId, TaskOutcome, TaskRegistry, TaskState, TaskSummary, UnitOfWork,
};
pub use util::config::{ConfigError, RegistryConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "taskpool";
