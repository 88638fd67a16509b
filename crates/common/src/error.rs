//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a validation failure on one named setting.
    pub fn invalid(setting: &str, reason: impl std::fmt::Display) -> Self {
        Error::Config(format!("{setting} {reason}"))
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_names_the_setting() {
        let err = Error::invalid("upstream.timeout_secs", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Configuration error: upstream.timeout_secs must be greater than 0"
        );
    }

    #[test]
    fn io_and_toml_convert() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(io.to_string().starts_with("I/O error:"), "got: {io}");

        let toml_err = toml::from_str::<toml::Table>("not = [valid").unwrap_err();
        let err: Error = toml_err.into();
        assert!(matches!(err, Error::Toml(_)));
    }
}
