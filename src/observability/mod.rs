//! Observability for the event bus client
//!
//! Structured logging setup and per-client metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{ClientMetrics, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{connection_span, dispatch_span};
