//! Shared types for the Claude relay workspace
//!
//! Secret handling and configuration errors used by the service binary.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, load_secret};
