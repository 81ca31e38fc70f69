//! Domain Layer - Core price types and the rolling history.
//!
//! This layer contains the price sample value type and the bounded history
//! buffer, with no dependency on transports or upstream APIs.

/// Price sample value type.
pub mod sample;

/// Fixed-capacity rolling history of samples.
pub mod history;
