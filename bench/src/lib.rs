//! Benchmark utilities for the relay message bus.
//!
//! - **Microbenchmarks**: single bus operations (send, broadcast, complete, cross-thread
//!   request/reply).
//! - **Scenario benchmarks**: seeded workloads that mix routing, fan-out and worker churn.
//! - **Latency stats**: per-round timing with percentiles.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p relay_bench
//!
//! # Run one group
//! cargo bench -p relay_bench -- scenario/churn
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports.

pub mod latency;
pub mod scenarios;
