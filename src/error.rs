//! Classified extraction errors
//!
//! Every failure an extractor can report maps onto one Python exception
//! class, which is what consumers of the JSON envelope match on.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::parsers::requirement::RequirementError;
use crate::parsers::setup_cfg::IniError;
use crate::sandbox::SandboxError;
use crate::utils::{python_exception_repr, python_str_repr};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    InvalidRequirement(#[from] RequirementError),

    /// pip-level failures such as an unopenable include or a malformed line
    #[error("{message}")]
    Installation { class: &'static str, message: String },

    #[error("{source}: {}", python_str_repr(&.path.to_string_lossy()))]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{message}")]
    ManifestParse { class: &'static str, message: String },

    #[error("{message}")]
    RequirementsFileParse { message: String },

    #[error(transparent)]
    ConfigParse(#[from] IniError),

    #[error(transparent)]
    SandboxExecution(#[from] SandboxError),
}

impl ExtractError {
    pub fn read(path: &Path, source: io::Error) -> Self {
        ExtractError::ManifestRead {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn installation(message: impl Into<String>) -> Self {
        ExtractError::Installation {
            class: "InstallationError",
            message: message.into(),
        }
    }

    pub fn toml(message: impl Into<String>) -> Self {
        ExtractError::ManifestParse {
            class: "TOMLDecodeError",
            message: message.into(),
        }
    }

    /// A pyproject surface holding the wrong TOML type
    pub fn surface_type(message: impl Into<String>) -> Self {
        ExtractError::ManifestParse {
            class: "TypeError",
            message: message.into(),
        }
    }

    pub fn requirements_file(message: impl Into<String>) -> Self {
        ExtractError::RequirementsFileParse {
            message: message.into(),
        }
    }

    /// Python exception class name reported in the envelope
    pub fn class_name(&self) -> &str {
        match self {
            ExtractError::InvalidRequirement(err) => err.class_name(),
            ExtractError::Installation { class, .. } => class,
            ExtractError::ManifestRead { source, .. } => io_error_class(source),
            ExtractError::ManifestParse { class, .. } => class,
            ExtractError::RequirementsFileParse { .. } => "RequirementsFileParseError",
            ExtractError::ConfigParse(err) => err.class_name(),
            ExtractError::SandboxExecution(err) => &err.class,
        }
    }

    /// `Class('message')`, the envelope's error string
    pub fn repr(&self) -> String {
        python_exception_repr(self.class_name(), &self.to_string())
    }
}

fn io_error_class(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::NotFound => "FileNotFoundError",
        io::ErrorKind::PermissionDenied => "PermissionError",
        io::ErrorKind::IsADirectory => "IsADirectoryError",
        io::ErrorKind::InvalidData => "UnicodeDecodeError",
        _ => "OSError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::requirement::Requirement;

    #[test]
    fn test_invalid_requirement_repr() {
        let err: ExtractError = Requirement::parse("foo>=1 bar").unwrap_err().into();
        assert_eq!(
            err.repr(),
            "InvalidRequirement('Expected end or semicolon (after version specifier)\\n    foo>=1 bar\\n           ^')"
        );
    }

    #[test]
    fn test_manifest_read_class() {
        let err = ExtractError::read(
            Path::new("missing/pyproject.toml"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert_eq!(err.class_name(), "FileNotFoundError");
        assert!(err.repr().starts_with("FileNotFoundError("));
        assert!(err.to_string().ends_with("'missing/pyproject.toml'"));
    }

    #[test]
    fn test_requirements_file_parse_repr() {
        let err = ExtractError::requirements_file("Invalid requirement: --bogus\nno such option: --bogus");
        assert_eq!(
            err.repr(),
            "RequirementsFileParseError('Invalid requirement: --bogus\\nno such option: --bogus')"
        );
    }

    #[test]
    fn test_manifest_parse_classes() {
        assert_eq!(ExtractError::toml("bad").class_name(), "TOMLDecodeError");
        assert_eq!(ExtractError::surface_type("bad").class_name(), "TypeError");
    }
}
