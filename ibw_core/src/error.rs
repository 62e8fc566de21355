use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IgorError>;

/// Coarse classification of an [`IgorError`].
///
/// A failure of any kind is fatal for the single wave it occurred in; none of
/// them is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Structurally invalid header, unsupported version or element type.
    Format,
    /// Header checksum mismatch (corruption or byte-order misdetection).
    Version,
    /// I/O failure, including a stream that ended early.
    Io,
    /// Known gap: text waves.
    NotImplemented,
    /// An in-archive path that does not name a wave.
    NotFound,
}

#[derive(Error, Debug)]
pub enum IgorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read in {what}: needed {expected} bytes, got {got}")]
    ShortRead {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("not an Igor binary wave: version field is {0} (supported: 1, 2, 3, 5)")]
    UnsupportedVersion(i16),

    #[error("unsupported wave type code {0:#x}")]
    UnsupportedType(i16),

    #[error("header checksum mismatch: expected {expected}, computed {computed}")]
    Checksum { expected: i16, computed: i16 },

    #[error(
        "wave data size mismatch: header declares {declared} bytes, {points} points need {expected}"
    )]
    SizeMismatch {
        declared: usize,
        points: usize,
        expected: usize,
    },

    #[error("format error: {0}")]
    Format(String),

    #[error("text waves are not supported")]
    TextWave,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<IgorError>,
    },
}

impl IgorError {
    pub fn format<S: Into<String>>(msg: S) -> Self {
        IgorError::Format(msg.into())
    }

    /// Attach the file a failure belongs to. Already-attached errors are
    /// returned unchanged.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            IgorError::File { .. } => self,
            other => IgorError::File {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IgorError::Io(_) | IgorError::ShortRead { .. } => ErrorKind::Io,
            IgorError::UnsupportedVersion(_)
            | IgorError::UnsupportedType(_)
            | IgorError::SizeMismatch { .. }
            | IgorError::Format(_) => ErrorKind::Format,
            IgorError::Checksum { .. } => ErrorKind::Version,
            IgorError::TextWave => ErrorKind::NotImplemented,
            IgorError::NotFound(_) => ErrorKind::NotFound,
            IgorError::File { source, .. } => source.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_wrapper_keeps_kind() {
        let err = IgorError::Checksum {
            expected: 0,
            computed: 7,
        }
        .at_path("/tmp/x.ibw");
        assert_eq!(err.kind(), ErrorKind::Version);
        let msg = err.to_string();
        assert!(msg.contains("x.ibw"), "{msg}");
        assert!(msg.contains("computed 7"), "{msg}");
    }

    #[test]
    fn at_path_does_not_nest() {
        let err = IgorError::TextWave.at_path("a.ibw").at_path("b.ibw");
        match err {
            IgorError::File { path, .. } => assert_eq!(path, PathBuf::from("a.ibw")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
