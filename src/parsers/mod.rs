//! Extractors for Python manifest files (pyproject.toml, requirement lists,
//! setup.py and setup.cfg)

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

use self::marker::MarkerTree;
use self::requirement::{Requirement, SpecifierSet};

/// A dependency declaration extracted from a manifest file
///
/// All nine keys are always serialized; absent values become `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Package name as declared (not canonicalized)
    pub name: String,
    /// Pinned version, only for a single `==`/`===` constraint
    pub version: Option<String>,
    /// Normalized environment marker
    pub markers: Option<String>,
    /// Declaring manifest
    pub file: String,
    /// Normalized specifier set, absent when unconstrained
    pub requirement: Option<String>,
    /// Sorted, duplicate-free extras
    pub extras: Vec<String>,
    /// Declaration bucket for setup.py / setup.cfg records
    pub requirement_type: Option<String>,
    /// `true` only for `[tool.uv.sources]` path overrides
    pub path_dependency: Option<bool>,
    pub path: Option<String>,
}

impl DependencyRecord {
    pub fn new(
        name: &str,
        specifier: &SpecifierSet,
        marker: Option<&MarkerTree>,
        extras: &BTreeSet<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            version: specifier.pinned_version().map(str::to_string),
            markers: marker.map(|m| m.to_string()).filter(|m| !m.is_empty()),
            file: file.into(),
            requirement: (!specifier.is_empty()).then(|| specifier.to_string()),
            extras: extras.iter().cloned().collect(),
            requirement_type: None,
            path_dependency: None,
            path: None,
        }
    }

    pub fn from_requirement(requirement: &Requirement, file: impl Into<String>) -> Self {
        Self::new(
            &requirement.name,
            &requirement.specifier,
            requirement.marker.as_ref(),
            &requirement.extras,
            file,
        )
    }

    /// A dependency resolved to a local directory instead of a registry
    pub fn path_override(name: &str, path: &str, file: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            markers: None,
            file: file.into(),
            requirement: None,
            extras: Vec::new(),
            requirement_type: None,
            path_dependency: Some(true),
            path: Some(path.to_string()),
        }
    }

    pub fn with_requirement_type(mut self, requirement_type: impl Into<String>) -> Self {
        self.requirement_type = Some(requirement_type.into());
        self
    }
}

/// Trait for extracting dependency records from a manifest or a directory
pub trait Extractor {
    /// Extract every declared dependency under `target`
    fn extract(&self, target: &Path) -> Result<Vec<DependencyRecord>, ExtractError>;
}

pub mod install_line;
pub mod marker;
pub mod pyproject;
pub mod requirement;
pub mod requirements_txt;
pub mod setup;
pub mod setup_cfg;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_all_keys() {
        let req = Requirement::parse("requests>=2.0").unwrap();
        let record = DependencyRecord::from_requirement(&req, "pyproject.toml");
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 9);
        assert_eq!(json["name"], "requests");
        assert!(json["version"].is_null());
        assert_eq!(json["requirement"], ">=2.0");
        assert_eq!(json["extras"], serde_json::json!([]));
        assert!(json["markers"].is_null());
        assert!(json["path_dependency"].is_null());
    }

    #[test]
    fn test_path_override_carries_no_constraints() {
        let record = DependencyRecord::path_override("local-lib", "../local-lib", "pyproject.toml");
        assert_eq!(record.path_dependency, Some(true));
        assert_eq!(record.path.as_deref(), Some("../local-lib"));
        assert!(record.version.is_none());
        assert!(record.markers.is_none());
        assert!(record.requirement.is_none());
        assert!(record.extras.is_empty());
    }

    #[test]
    fn test_requirement_type_tag() {
        let req = Requirement::parse("click>=7").unwrap();
        let record =
            DependencyRecord::from_requirement(&req, "setup.py").with_requirement_type("install_requires");
        assert_eq!(record.requirement_type.as_deref(), Some("install_requires"));
    }
}
