use std::io;
use thiserror::Error;

/// The kind of failure, independent of the field path that produced it.
///
/// This lets callers match on *what* went wrong without parsing the
/// formatted message, while `Error`'s `Display` still carries the full
/// path for humans.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorKind {
    Definition,
    StreamExhausted,
    Write,
    WrongMagic,
    Misaligned,
    UnknownDependentField,
    Check,
    ImpossibleLength,
    Parse,
    Io,
}

/// The single structured error surface of the engine: every field-level
/// failure is wrapped with the offending field's full dotted path before
/// being re-raised by the driver (see `Structure::decode`/`encode`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: illegal field definition: {message}")]
    Definition { path: String, message: String },

    #[error("{path}: stream exhausted: needed {needed} bytes, got {available}")]
    StreamExhausted {
        path: String,
        needed: usize,
        available: usize,
    },

    #[error("{path}: cannot encode value: {message}")]
    Write { path: String, message: String },

    #[error("{path}: constant/magic mismatch")]
    WrongMagic { path: String },

    #[error("{path}: byte-level operation attempted while the bit buffer is non-empty")]
    Misaligned { path: String },

    #[error("{path}: dependent field '{field}' is not known yet")]
    UnknownDependentField { path: String, field: String },

    #[error("{path}: check failed: {message}")]
    Check { path: String, message: String },

    #[error("{path}: length is not statically known")]
    ImpossibleLength { path: String },

    #[error("{path}: {message}")]
    Parse { path: String, message: String },

    #[error("{path}: io error: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Definition { .. } => ErrorKind::Definition,
            Error::StreamExhausted { .. } => ErrorKind::StreamExhausted,
            Error::Write { .. } => ErrorKind::Write,
            Error::WrongMagic { .. } => ErrorKind::WrongMagic,
            Error::Misaligned { .. } => ErrorKind::Misaligned,
            Error::UnknownDependentField { .. } => ErrorKind::UnknownDependentField,
            Error::Check { .. } => ErrorKind::Check,
            Error::ImpossibleLength { .. } => ErrorKind::ImpossibleLength,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Error::Definition { path, .. }
            | Error::StreamExhausted { path, .. }
            | Error::Write { path, .. }
            | Error::WrongMagic { path, .. }
            | Error::Misaligned { path, .. }
            | Error::UnknownDependentField { path, .. }
            | Error::Check { path, .. }
            | Error::ImpossibleLength { path, .. }
            | Error::Parse { path, .. }
            | Error::Io { path, .. } => path,
        }
    }

    /// Prepends `prefix` to this error's path, used by the structure driver
    /// when it re-raises an error bubbling up from a field it owns.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let joined = |p: &str| {
            if p.is_empty() {
                prefix.to_owned()
            } else {
                format!("{prefix}.{p}")
            }
        };
        match &mut self {
            Error::Definition { path, .. }
            | Error::StreamExhausted { path, .. }
            | Error::Write { path, .. }
            | Error::WrongMagic { path, .. }
            | Error::Misaligned { path, .. }
            | Error::UnknownDependentField { path, .. }
            | Error::Check { path, .. }
            | Error::ImpossibleLength { path, .. }
            | Error::Parse { path, .. }
            | Error::Io { path, .. } => *path = joined(path),
        }
        self
    }

    pub fn definition<S: Into<String>>(path: S, message: impl Into<String>) -> Self {
        Error::Definition {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn stream_exhausted<S: Into<String>>(path: S, needed: usize, available: usize) -> Self {
        Error::StreamExhausted {
            path: path.into(),
            needed,
            available,
        }
    }

    pub fn write<S: Into<String>>(path: S, message: impl Into<String>) -> Self {
        Error::Write {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn wrong_magic<S: Into<String>>(path: S) -> Self {
        Error::WrongMagic { path: path.into() }
    }

    pub fn misaligned<S: Into<String>>(path: S) -> Self {
        Error::Misaligned { path: path.into() }
    }

    pub fn unknown_dependent_field<S: Into<String>>(path: S, field: impl Into<String>) -> Self {
        Error::UnknownDependentField {
            path: path.into(),
            field: field.into(),
        }
    }

    pub fn check<S: Into<String>>(path: S, message: impl Into<String>) -> Self {
        Error::Check {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn impossible_length<S: Into<String>>(path: S) -> Self {
        Error::ImpossibleLength { path: path.into() }
    }

    pub fn parse<S: Into<String>>(path: S, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io<S: Into<String>>(path: S, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
