//! Command implementations

pub mod compile;
pub mod decompile;
pub mod info;
pub mod strings;
pub mod validate;
