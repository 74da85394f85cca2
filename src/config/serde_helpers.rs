use super::ConfigError;

/// Serializes a `Duration` as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Variable lookup used by the loaders below. `std::env::var` in production,
/// a map in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Parses `name` into `target` when it is set. Unset keeps the current value.
pub fn load_env_var<T>(env: EnvLookup<'_>, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = env(name) {
        *target = value
            .trim()
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

/// Loads a millisecond count into a `Duration`.
pub fn load_env_millis(
    env: EnvLookup<'_>,
    name: &str,
    target: &mut std::time::Duration,
) -> Result<(), ConfigError> {
    let mut millis = target.as_millis() as u64;
    load_env_var(env, name, &mut millis)?;
    *target = std::time::Duration::from_millis(millis);
    Ok(())
}

pub fn load_env_string(env: EnvLookup<'_>, name: &str, target: &mut String) {
    if let Some(value) = env(name) {
        *target = value;
    }
}

pub fn load_env_string_opt(env: EnvLookup<'_>, name: &str, target: &mut Option<String>) {
    if let Some(value) = env(name) {
        *target = Some(value).filter(|v| !v.is_empty());
    }
}

pub fn load_env_path_opt(env: EnvLookup<'_>, name: &str, target: &mut Option<std::path::PathBuf>) {
    if let Some(value) = env(name) {
        *target = Some(std::path::PathBuf::from(value));
    }
}

/// Comma-separated list; blank items are skipped.
pub fn load_env_list(env: EnvLookup<'_>, name: &str, target: &mut Vec<String>) {
    if let Some(value) = env(name) {
        *target = value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect();
    }
}
