//! # Utility Modules
//!
//! Supporting utilities shared by the server and client.
//!
//! ## Components
//! - **Logging**: tracing subscriber setup
//! - **Metrics**: Thread-safe observability counters
//! - **Time**: Wall-clock timestamps for the wire

pub mod logging;
pub mod metrics;
pub mod time;

pub use metrics::{Metrics, MetricsSnapshot};
