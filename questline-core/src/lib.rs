//! Core library for Questline.
//!
//! This crate provides the domain models, storage, pulse/health derivation and
//! next-task scoring for Questline, independent of any transport layer.
//!
//! # Usage
//!
//! ```no_run
//! use questline_core::db::Database;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! if let Some(next) = db.next_task_recommendation(None)? {
//!     println!("{}", next.reason);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod db;
pub mod error;
pub mod health;
pub mod models;
pub mod pulse;
pub mod scorer;

// Re-export commonly used types at crate root
pub use db::Database;
pub use error::{DecodeError, StoreError, StoreResult};
