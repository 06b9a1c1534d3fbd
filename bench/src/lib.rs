//! Benchmark utilities for relay.
//!
//! This crate provides the fixtures shared by the Criterion benchmarks:
//!
//! - **Payloads**: event values of realistic size to push through a broadcaster
//! - **Delivery timing**: send-to-receive latency statistics per subscriber
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p relay_bench
//!
//! # Run specific benchmark group
//! cargo bench -p relay_bench -- send
//! ```
//!
//! # Benchmark Results
//!
//! Results are written to `target/criterion/` with HTML reports for visualization.

pub mod delivery;
pub mod payload;
