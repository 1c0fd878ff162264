//! dependi-python - dependency extraction for Python manifests
//!
//! Reads `pyproject.toml`, pip requirement lists, `setup.py` and
//! `setup.cfg` and reports every declared dependency as a
//! [`DependencyRecord`]. `setup.py` is evaluated in an in-process sandbox
//! that never touches the host environment.

pub mod config;
pub mod envelope;
pub mod error;
pub mod parsers;
pub mod sandbox;
pub mod utils;

use std::path::Path;

use crate::config::Config;
use crate::error::ExtractError;
use crate::parsers::Extractor;
use crate::parsers::pyproject::PyprojectExtractor;
use crate::parsers::requirements_txt::RequirementsExtractor;
use crate::parsers::setup::SetupExtractor;

pub use crate::envelope::Envelope;
pub use crate::parsers::DependencyRecord;

/// Dependencies declared in a single pyproject.toml
pub fn extract_pyproject(path: impl AsRef<Path>) -> Result<Vec<DependencyRecord>, ExtractError> {
    PyprojectExtractor::new().extract(path.as_ref())
}

/// Dependencies declared in the requirement lists of a directory
pub fn extract_requirements(
    directory: impl AsRef<Path>,
) -> Result<Vec<DependencyRecord>, ExtractError> {
    extract_requirements_with(directory, &Config::from_env())
}

pub fn extract_requirements_with(
    directory: impl AsRef<Path>,
    config: &Config,
) -> Result<Vec<DependencyRecord>, ExtractError> {
    RequirementsExtractor::new(config.requirements.clone()).extract(directory.as_ref())
}

/// Dependencies declared in the setup.py and setup.cfg of a directory
pub fn extract_setup(directory: impl AsRef<Path>) -> Result<Vec<DependencyRecord>, ExtractError> {
    extract_setup_with(directory, &Config::from_env())
}

pub fn extract_setup_with(
    directory: impl AsRef<Path>,
    config: &Config,
) -> Result<Vec<DependencyRecord>, ExtractError> {
    SetupExtractor::new(config.setup.clone()).extract(directory.as_ref())
}
