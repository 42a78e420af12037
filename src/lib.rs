//! In-Process Task Scheduler Library
//!
//! This library crate defines the modules that make up the scheduling service.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Modules
//! - **`scheduler`**: The scheduling engine. A single-writer loop dispatches
//!   prioritised tasks to a supervised worker pool, retries failures and
//!   answers status queries. Also holds the service facade and HTTP routes.
//! - **`config`**: TOML-backed configuration with defaults for every field.
//! - **`error`**: Error type shared by the library API.

pub mod config;
pub mod error;
pub mod scheduler;
