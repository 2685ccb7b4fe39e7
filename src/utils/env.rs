/// Get environment variable with MEMBERFLOW_ prefix, falling back to unprefixed version
///
/// Checks `MEMBERFLOW_{key}` first, then `{key}`.
///
/// # Examples
///
/// ```rust
/// use memberflow::utils::get_env_with_prefix;
///
/// // Checks MEMBERFLOW_PERIOD_UNIT first, then PERIOD_UNIT
/// let unit = get_env_with_prefix("PERIOD_UNIT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("MEMBERFLOW_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse an environment variable, ignoring values that fail to parse.
pub(crate) fn parse_env_with_prefix<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|value| value.trim().parse().ok())
}
