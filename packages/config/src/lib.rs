// ABOUTME: Shared configuration primitives for Invoker packages
// ABOUTME: Exposes environment variable names and parsing helpers

pub mod constants;
pub mod env;

pub use env::{parse_env_list, parse_env_or_default, parse_env_with_fallback};
