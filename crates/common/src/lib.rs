//! Shared types for the keypool workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
