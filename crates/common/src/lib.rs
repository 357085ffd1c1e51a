//! Common utilities and types shared across the dpvs administration crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
