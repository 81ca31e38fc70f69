//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surface.

/// Subscriber fan-out with bounded per-subscriber queues.
pub mod broadcast;

/// CoinDesk price source adapter.
pub mod coindesk;

/// Configuration loading from the environment.
pub mod config;

/// Health check and metrics routes.
pub mod health;

/// HTTP API server (REST, SSE, WebSocket).
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
