// Crate-wide error type.
//
// Three failure kinds matter to callers of the transcoder: the input ran out
// mid-structure (a streaming caller may supply more), a pre-sized output
// buffer was too small, or the input is structurally impossible. Stream
// variants that cannot perform an operation (reading a sink, writing a
// read-only buffer) report `Unsupported`. Raw I/O failures pass through.

use std::io;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InsufficientInput,
    InsufficientOutput,
    InvalidInput,
    Unsupported,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("insufficient input: {0}")]
    InsufficientInput(String),

    #[error("insufficient output: {0}")]
    InsufficientOutput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientInput(_) => ErrorKind::InsufficientInput,
            Self::InsufficientOutput(_) => ErrorKind::InsufficientOutput,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // A short read is the same condition as a bit reader running dry.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::InsufficientInput(e.to_string())
        } else {
            Self::Io(e)
        }
    }
}

/// Shorthand constructors used throughout the crate.
pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidInput(msg.into())
}

pub(crate) fn insufficient_input(msg: impl Into<String>) -> Error {
    Error::InsufficientInput(msg.into())
}

pub(crate) fn unsupported(msg: impl Into<String>) -> Error {
    Error::Unsupported(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_eof_maps_to_insufficient_input() {
        let e: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert_eq!(e.kind(), ErrorKind::InsufficientInput);
    }

    #[test]
    fn other_io_errors_pass_through() {
        let e: Error = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(e.kind(), ErrorKind::Io);
        assert!(e.to_string().starts_with("I/O error"));
    }

    #[test]
    fn display_names_the_kind() {
        assert_eq!(invalid("bad LEN").to_string(), "invalid input: bad LEN");
        assert_eq!(
            insufficient_input("eof").to_string(),
            "insufficient input: eof"
        );
    }
}
