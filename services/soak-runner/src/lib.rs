//! Perpetual soak harness for a shared key-value store.
//!
//! This crate provides tools to:
//! - Seed a fixed key space and keep it under continuous mixed load
//! - Run point get/set, set-membership, and lock-contention loops forever
//! - Collect per-operation latency and error counts while running
//! - Serve liveness and live statistics over HTTP

pub mod config;
pub mod contention;
pub mod keyspace;
pub mod metrics;
pub mod report;
pub mod server;
pub mod workload;

pub use config::{LockConfig, SoakConfig};
pub use keyspace::{KeySpace, BUCKET_SIZE};
pub use metrics::{MetricsHandle, MetricsSnapshot, OpKind};
pub use report::SummaryReport;
pub use workload::WorkloadSuite;
