//! Configuration Module
//!
//! Configuration loading for the price streamer.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_COINDESK_API_URL, ServerSettings, SourceSettings, StreamSettings,
    StreamerConfig,
};
