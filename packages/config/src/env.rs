// ABOUTME: Environment variable parsing utilities
// ABOUTME: Provides helper functions for parsing and validating environment variables

use std::str::FromStr;

/// Parse an environment variable with a fallback default value
/// Returns the parsed value or the default if the variable is not set, blank, or cannot be parsed
pub fn parse_env_or_default<T>(var_name: &str, default: T) -> T
where
    T: FromStr,
{
    let Ok(raw_value) = std::env::var(var_name) else {
        return default;
    };
    let raw_value = raw_value.trim();
    if raw_value.is_empty() {
        return default;
    }

    raw_value.parse::<T>().unwrap_or_else(|_| {
        tracing::warn!(
            "Environment variable {} has unparseable value '{}', using default",
            var_name,
            raw_value
        );
        default
    })
}

/// Parse an environment variable with fallback to another variable
/// Tries the primary variable first, then falls back to the secondary, then to the default
pub fn parse_env_with_fallback<T>(primary_var: &str, fallback_var: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(primary_var)
        .or_else(|_| std::env::var(fallback_var))
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Parse a comma separated environment variable into trimmed, non-empty entries
pub fn parse_env_list(var_name: &str) -> Vec<String> {
    std::env::var(var_name)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
