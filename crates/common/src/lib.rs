//! Common utilities and types shared across Sitewatch components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
