//! # Demwatch Common Library
//!
//! Shared code for the demwatch services including:
//! - Common error types
//! - Configuration loading and data folder resolution
//! - Share-code normalization and codec

pub mod config;
pub mod error;
pub mod sharecode;

pub use error::{Error, Result};
pub use sharecode::{DecodedCode, ShareCodeError};
