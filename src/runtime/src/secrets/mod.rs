//! Environment encryption service.
//!
//! Splits an env file into public and private variables and encrypts the
//! private half for one application.

pub mod encrypt;
pub mod envfile;

pub use encrypt::{decrypt, EnvironmentEncryptor, EnvironmentPayload, ProtectedHeader};
pub use envfile::{EnvFile, EnvSplit, MACHINE_TYPE_KEY};
