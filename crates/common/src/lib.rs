//! Helpers shared by the livefeed crates.

pub mod context;

pub use context::FromMessage;
