//! Utility functions and helpers.

pub mod env;

pub use env::get_env_with_prefix;
pub(crate) use env::parse_env_with_prefix;
