//! Utility functions for the CLI

pub mod format;
pub mod table;

pub use format::*;
pub use table::*;
