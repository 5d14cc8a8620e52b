//! Error types for merge-mod operations

use crate::services::MessageLog;
use std::io;
use thiserror::Error;

/// Result type alias for merge-mod operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for merge-mod operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad magic or otherwise malformed container
    #[error("Invalid merge mod format: {0}")]
    InvalidFormat(String),

    /// Container version is above what this codec understands
    #[error("Unsupported merge mod version {found} (highest supported: {supported})")]
    UnsupportedVersion {
        /// Version read from the stream
        found: u8,
        /// Highest version the reader was configured for
        supported: u8,
    },

    /// Stream did not end where the container did
    #[error("Corrupt container: parsing ended at offset {position}, stream length is {length}")]
    Corruption {
        /// Position after the last parsed byte
        position: u64,
        /// Total stream length
        length: u64,
    },

    /// Schema, allow-list or vanilla-class violations
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Property path could not be walked
    #[error("Property path error on {entry}: {message}")]
    Path {
        /// Entry the update targeted
        entry: String,
        /// What went wrong
        message: String,
    },

    /// Unknown property type tag or malformed literal
    #[error("Property type error on {entry}: {message}")]
    Type {
        /// Entry the update targeted
        entry: String,
        /// What went wrong
        message: String,
    },

    /// Object reference did not resolve inside the target container
    #[error("Unresolved object reference on {entry}: {target}")]
    Reference {
        /// Entry the update targeted
        entry: String,
        /// The referenced path that was not found
        target: String,
    },

    /// Script compiler reported errors
    #[error("Compilation failed for {entry}: {log}")]
    Compile {
        /// Entry the update targeted
        entry: String,
        /// Full compiler diagnostics
        log: MessageLog,
    },

    /// Object porter reported errors
    #[error("Porting failed for {entry}: {}", .diagnostics.join("; "))]
    Port {
        /// Entry the update targeted
        entry: String,
        /// Aggregated porter diagnostics
        diagnostics: Vec<String>,
    },

    /// Asset payload could not be loaded
    #[error("Cannot load asset {name}: {reason}")]
    AssetLoad {
        /// Asset name
        name: String,
        /// Why the load failed
        reason: String,
    },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Manifest or package JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Target container could not be resolved in the installation
    #[error("Target file not found in installation: {0}")]
    TargetNotFound(String),

    /// Entry path does not exist in the target container
    #[error("Entry not found in {file}: {entry}")]
    EntryNotFound {
        /// Container file name
        file: String,
        /// Missing entry path
        entry: String,
    },
}

impl Error {
    /// Create a new InvalidFormat error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Create a new Compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Error::Compression(msg.into())
    }

    /// Create a single-issue Validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(vec![msg.into()])
    }

    /// Create a new AssetLoad error
    pub fn asset_load<N: Into<String>, S: Into<String>>(name: N, reason: S) -> Self {
        Error::AssetLoad {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was raised while reading a container
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_) | Error::UnsupportedVersion { .. } | Error::Corruption { .. }
        )
    }

    /// Check if this error was raised by a change executor
    pub fn is_apply_error(&self) -> bool {
        matches!(
            self,
            Error::Path { .. }
                | Error::Type { .. }
                | Error::Reference { .. }
                | Error::Compile { .. }
                | Error::Port { .. }
                | Error::EntryNotFound { .. }
        )
    }

    /// Entry path carried by apply-time errors
    pub fn entry(&self) -> Option<&str> {
        match self {
            Error::Path { entry, .. }
            | Error::Type { entry, .. }
            | Error::Reference { entry, .. }
            | Error::Compile { entry, .. }
            | Error::Port { entry, .. }
            | Error::EntryNotFound { entry, .. } => Some(entry),
            _ => None,
        }
    }
}
