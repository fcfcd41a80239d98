use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// CinderDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The manifest could not be decoded: a truncated varint, a short byte
    /// string, an unknown tag, or a field this engine rejects. Fatal to
    /// manifest replay; the store cannot be opened.
    CorruptManifest(String),
    /// An internal invariant was violated: overlapping files in a deep level,
    /// misordered level contents, or an edit batch that deletes files which
    /// were never present. Indicates a bug in the caller.
    Consistency(String),
    /// An IO error.
    IO(String),
    /// A mutex was poisoned by a panic in another thread.
    MutexPoisoned(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CorruptManifest(msg) => write!(f, "corrupt manifest: {msg}"),
            Error::Consistency(msg) => write!(f, "consistency violation: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::MutexPoisoned(msg) => write!(f, "mutex poisoned: {msg}"),
        }
    }
}

/// Constructs an Error::CorruptManifest for the given format string.
#[macro_export]
macro_rules! errcorrupt {
    ($($args:tt)*) => { $crate::error::Error::CorruptManifest(format!($($args)*)).into() };
}

/// Constructs an Error::Consistency for the given format string.
#[macro_export]
macro_rules! errconsistency {
    ($($args:tt)*) => { $crate::error::Error::Consistency(format!($($args)*)).into() };
}

/// A CinderDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::MutexPoisoned(err.to_string())
    }
}
