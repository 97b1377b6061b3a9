//! Configuration management utilities
//!
//! Settings come from the process environment, optionally seeded from a
//! `.env` file in the working directory or one of its parents.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required variable is absent
    #[error("missing required setting: {0}")]
    Missing(String),

    /// A variable is present but unusable
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Setting name
        key: String,
        /// What was wrong with it
        message: String,
    },
}

/// Load `.env` into the process environment if one can be found
///
/// Variables already set in the environment win over the file.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!("Loaded environment from {}", path.display());
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable .env file: {}", e);
            None
        }
    }
}

/// Read and parse an optional variable; empty values count as unset
pub fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

/// Read and parse a variable, falling back to `default` when unset
pub fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers() {
        unsafe {
            std::env::set_var("AGENT_UTILS_TEST_NUM", " 42 ");
            std::env::set_var("AGENT_UTILS_TEST_BAD", "forty");
            std::env::set_var("AGENT_UTILS_TEST_EMPTY", "");
        }

        assert_eq!(env_or::<u32>("AGENT_UTILS_TEST_NUM", 1).unwrap(), 42);
        assert_eq!(env_or::<u32>("AGENT_UTILS_TEST_EMPTY", 7).unwrap(), 7);
        assert_eq!(env_opt::<u32>("AGENT_UTILS_TEST_UNSET").unwrap(), None);

        let err = env_opt::<u32>("AGENT_UTILS_TEST_BAD").unwrap_err();
        assert!(err.to_string().contains("AGENT_UTILS_TEST_BAD"));

        unsafe {
            std::env::remove_var("AGENT_UTILS_TEST_NUM");
            std::env::remove_var("AGENT_UTILS_TEST_BAD");
            std::env::remove_var("AGENT_UTILS_TEST_EMPTY");
        }
    }
}
