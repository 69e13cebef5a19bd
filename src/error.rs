// Error types

use std::path::PathBuf;

use thiserror::Error;

/// Every failure a delegation run can end in.
///
/// None of the messages carry the passphrase or record secrets, so the whole
/// enum is safe to print to the error stream.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Config parse error: {0}")]
    ConfigParse(String),
    #[error("Failed to read passphrase: {0}")]
    Prompt(String),
    #[error("could not find {}", .0.display())]
    StoreNotFound(PathBuf),
    #[error("Failed to open password store: {0}")]
    StoreOpen(String),
    #[error("{0} is not a valid label.")]
    RecordNotFound(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Delegation failed: {0}")]
    Dispatch(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
