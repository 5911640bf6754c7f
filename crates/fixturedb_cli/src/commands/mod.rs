//! CLI command implementations.

pub mod execute;
pub mod ping;
pub mod query;
pub mod tables;
