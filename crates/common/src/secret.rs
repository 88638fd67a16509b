//! Secret wrapper for sensitive values

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value, redacted in Debug/Display/logs and zeroed on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Resolve a secret string from `env_var`, falling back to the contents of
/// `file`. The env var wins when set. Surrounding whitespace is trimmed and
/// an empty value counts as absent. A configured but unreadable file is an
/// error.
pub fn load_secret(env_var: &str, file: Option<&Path>) -> Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(Some(Secret::new(value.to_owned())));
        }
    }

    let Some(file) = file else {
        return Ok(None);
    };
    let mut contents = std::fs::read_to_string(file)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", file.display())))?;
    let value = contents.trim().to_owned();
    contents.zeroize();

    Ok((!value.is_empty()).then(|| Secret::new(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacts_debug() {
        let secret = Secret::new(String::from("proxy-password"));
        let debug = format!("{:?}", secret);
        assert_eq!(debug, "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
    }

    #[test]
    fn test_secret_exposes_value() {
        let secret = Secret::new(String::from("proxy-password"));
        assert_eq!(secret.expose(), "proxy-password");
    }

    #[test]
    fn test_load_secret_from_file_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "  hunter2\n").unwrap();

        let secret = load_secret("COMMON_TEST_UNSET_SECRET", Some(&path)).unwrap();
        assert_eq!(secret.unwrap().expose(), "hunter2");
    }

    #[test]
    fn test_load_secret_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, " \n ").unwrap();

        assert!(load_secret("COMMON_TEST_UNSET_SECRET", Some(&path)).unwrap().is_none());
    }

    #[test]
    fn test_load_secret_missing_file_errors() {
        let result = load_secret(
            "COMMON_TEST_UNSET_SECRET",
            Some(Path::new("/nonexistent/password")),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_secret_nothing_configured() {
        assert!(load_secret("COMMON_TEST_UNSET_SECRET", None).unwrap().is_none());
    }
}
