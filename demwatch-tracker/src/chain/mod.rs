//! Match code chain resolution
//!
//! The external authority only answers "give me the code after X"; these
//! modules walk that chain with a bounded depth, classify its failure
//! modes, and register each newly discovered code as a placeholder match
//! plus an artifact acquisition job.

pub mod client;
pub mod resolver;

pub use client::{ChainClient, ChainStep};
pub use resolver::{ChainResolver, ResolveOutcome, StopReason};
