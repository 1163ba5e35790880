//! # medfuse Common Library
//!
//! Shared code for the medfuse engine and its tooling:
//! - Error type
//! - Configuration loading (TOML, environment, built-in defaults)
//! - Event types and the broadcast EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

mod defaults;

pub use config::EngineConfig;
pub use error::{Error, Result};
