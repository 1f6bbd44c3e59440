//! PostgreSQL integration
//!
//! The same pooled client serves the source warehouse and the
//! `resources_inc` resource store.

pub mod client;
pub mod sink;

pub use client::PostgreSQLClient;
pub use sink::PostgresSink;
