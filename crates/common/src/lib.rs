//! Common utilities and types shared across the disruption sampler crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
