use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing one session's transcript.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("session file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied reading file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON at line {line} in {path}: {message}")]
    MalformedJson {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl ParseError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors raised while discovering a provider's session root.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("sessions directory not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("cannot access sessions directory: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("home directory not found")]
    HomeDirNotFound,
}

impl DiscoveryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::RootNotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_contains_path() {
        let err = ParseError::not_found("/path/to/file.jsonl");
        assert!(err.to_string().contains("/path/to/file.jsonl"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn parse_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert!(matches!(ParseError::io("/x", io_err), ParseError::NotFound { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            ParseError::io("/x", io_err),
            ParseError::PermissionDenied { .. }
        ));

        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
        assert!(matches!(ParseError::io("/x", io_err), ParseError::Io { .. }));
    }

    #[test]
    fn discovery_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        assert!(matches!(
            DiscoveryError::io("/x", io_err),
            DiscoveryError::RootNotFound { .. }
        ));
    }
}
