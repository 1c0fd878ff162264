//! Legacy packaging declarations: setup.py and setup.cfg
//!
//! setup.py is evaluated in the sandbox with a recording `setup()` hook;
//! setup.cfg is read with configparser semantics. Both yield raw
//! requirement lines tagged with their declaration bucket.

use std::fs;
use std::path::Path;

use super::install_line::InstallLine;
use super::setup_cfg::{self, IniDocument};
use super::{DependencyRecord, Extractor};
use crate::config::SetupConfig;
use crate::error::ExtractError;
use crate::sandbox::evaluate_setup_script;
use crate::utils::strip_comment;

/// The `setup()` keyword a requirement was declared under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    SetupRequires,
    InstallRequires,
    TestsRequire,
    /// `extras_require` group, keyed by extra name
    ExtrasRequire(String),
}

impl DeclarationKind {
    /// Keyword / option name
    pub fn key(&self) -> &str {
        match self {
            DeclarationKind::SetupRequires => "setup_requires",
            DeclarationKind::InstallRequires => "install_requires",
            DeclarationKind::TestsRequire => "tests_require",
            DeclarationKind::ExtrasRequire(_) => "extras_require",
        }
    }

    /// `requirement_type` value of the resulting records
    pub fn tag(&self) -> String {
        match self {
            DeclarationKind::ExtrasRequire(group) => format!("extras_require:{group}"),
            other => other.key().to_string(),
        }
    }
}

/// Extracts records from the setup.py and setup.cfg of a directory
#[derive(Debug, Clone, Default)]
pub struct SetupExtractor {
    config: SetupConfig,
}

impl SetupExtractor {
    pub fn new(config: SetupConfig) -> Self {
        Self { config }
    }

    fn extract_script(&self, directory: &Path) -> Result<Vec<DependencyRecord>, ExtractError> {
        let path = directory.join(&self.config.script_name);
        let source = read_manifest(&path)?;
        let recorded = evaluate_setup_script(&source, &self.config.sandbox)?;

        let mut records = Vec::new();
        for entry in recorded {
            if let Some(record) =
                declaration_record(&entry.raw, &entry.kind, directory, &self.config.script_name)?
            {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn extract_config(&self, directory: &Path) -> Result<Vec<DependencyRecord>, ExtractError> {
        let path = directory.join(&self.config.config_name);
        let content = read_manifest(&path)?;
        let document = IniDocument::parse(&content, &self.config.config_name)?;

        let mut records = Vec::new();
        for (kind, lines) in setup_cfg::declarations(&document)? {
            for line in lines {
                if let Some(record) =
                    declaration_record(&line, &kind, directory, &self.config.config_name)?
                {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl Extractor for SetupExtractor {
    fn extract(&self, directory: &Path) -> Result<Vec<DependencyRecord>, ExtractError> {
        let mut records = Vec::new();

        if directory.join(&self.config.script_name).is_file() {
            tracing::debug!("Evaluating {}", self.config.script_name);
            records.extend(self.extract_script(directory)?);
        }
        if directory.join(&self.config.config_name).is_file() {
            tracing::debug!("Reading {}", self.config.config_name);
            records.extend(self.extract_config(directory)?);
        }

        tracing::info!(
            "Extracted {} dependencies from legacy manifests in {}",
            records.len(),
            directory.display()
        );
        Ok(records)
    }
}

fn read_manifest(path: &Path) -> Result<String, ExtractError> {
    fs::read_to_string(path).map_err(|err| ExtractError::read(path, err))
}

/// Turn one declared line into a record; linked and blank entries are
/// skipped.
fn declaration_record(
    raw: &str,
    kind: &DeclarationKind,
    directory: &Path,
    file: &str,
) -> Result<Option<DependencyRecord>, ExtractError> {
    let line = strip_comment(raw);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let install_line = InstallLine::parse(line, directory, None)?;
    if let Some(link) = &install_line.link {
        tracing::debug!("Skipping linked {} entry {}", kind.tag(), link.as_str());
        return Ok(None);
    }

    Ok(install_line
        .to_record(file)
        .map(|record| record.with_requirement_type(kind.tag())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn extract(dir: &TempDir) -> Result<Vec<DependencyRecord>, ExtractError> {
        SetupExtractor::default().extract(dir.path())
    }

    #[test]
    fn test_declaration_kind_tags() {
        assert_eq!(DeclarationKind::InstallRequires.tag(), "install_requires");
        assert_eq!(
            DeclarationKind::ExtrasRequire("socks".to_string()).tag(),
            "extras_require:socks"
        );
        assert_eq!(
            DeclarationKind::ExtrasRequire("socks".to_string()).key(),
            "extras_require"
        );
    }

    #[test]
    fn test_setup_py_buckets() {
        let dir = project(&[(
            "setup.py",
            r#"
from setuptools import setup, find_packages

setup(
    name="demo",
    packages=find_packages(),
    install_requires=["requests==2.31.0", "click>=7  # cli"],
    extras_require={"socks": ["PySocks>=1.5.6,!=1.5.7"]},
    tests_require=["pytest"],
)
"#,
        )]);

        let records = extract(&dir).unwrap();
        let summary: Vec<(&str, Option<&str>, Option<&str>)> = records
            .iter()
            .map(|r| {
                (
                    r.name.as_str(),
                    r.version.as_deref(),
                    r.requirement_type.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("requests", Some("2.31.0"), Some("install_requires")),
                ("click", None, Some("install_requires")),
                ("pytest", None, Some("tests_require")),
                ("PySocks", None, Some("extras_require:socks")),
            ]
        );
        assert!(records.iter().all(|r| r.file == "setup.py"));
        assert_eq!(records[3].requirement.as_deref(), Some("!=1.5.7,>=1.5.6"));
    }

    #[test]
    fn test_setup_py_skips_linked_entries() {
        let dir = project(&[(
            "setup.py",
            "import setuptools\nsetuptools.setup(install_requires=[\n    'six',\n    'git+https://github.com/org/lib.git#egg=lib',\n    '',\n])\n",
        )]);
        let records = extract(&dir).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "six");
    }

    #[test]
    fn test_direct_references_are_linked_entries() {
        let dir = project(&[
            (
                "setup.py",
                "from setuptools import setup\nsetup(install_requires=['six', 'pkg @ git+https://github.com/org/pkg.git'])\n",
            ),
            (
                "setup.cfg",
                "[options]\ntests_require =\n    pytest\n    localpkg @ file:///opt/src/localpkg\n",
            ),
        ]);
        let records = extract(&dir).unwrap();
        let names: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.file.as_str()))
            .collect();
        assert_eq!(names, vec![("six", "setup.py"), ("pytest", "setup.cfg")]);
    }

    #[test]
    fn test_setup_py_reads_fake_files() {
        let dir = project(&[(
            "setup.py",
            r#"
import os
from distutils.core import setup

here = os.path.abspath(os.path.dirname(__file__))
with open(os.path.join(here, "pkg", "__init__.py")) as f:
    version = f.read().split("__version__ = '")[1].split("'")[0]

print("building", version)
setup(install_requires=["attrs=={}".format(version)])
"#,
        )]);
        let records = extract(&dir).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version.as_deref(), Some("0.0.1+placeholder"));
    }

    #[test]
    fn test_setup_py_failure_is_classified() {
        let dir = project(&[("setup.py", "from setuptools import setup\nsetup(install_requires=undefined)\n")]);
        let err = extract(&dir).unwrap_err();
        assert_eq!(err.class_name(), "NameError");
        assert_eq!(err.repr(), "NameError(\"name 'undefined' is not defined\")");
    }

    #[test]
    fn test_setup_cfg_sections() {
        let dir = project(&[(
            "setup.cfg",
            "[options]\ninstall_requires =\n    requests>=2.0 # http\n    six; python_version<\"3\"\n\n[options.extras_require]\nsecurity = cryptography\n",
        )]);
        let records = extract(&dir).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "requests");
        assert_eq!(records[0].file, "setup.cfg");
        assert_eq!(records[1].markers.as_deref(), Some("python_version < \"3\""));
        assert_eq!(
            records[2].requirement_type.as_deref(),
            Some("extras_require:security")
        );
    }

    #[test]
    fn test_setup_py_before_setup_cfg() {
        let dir = project(&[
            ("setup.cfg", "[options]\ntests_require = pytest\n"),
            ("setup.py", "from setuptools import setup\nsetup(install_requires=['flask'])\n"),
        ]);
        let records = extract(&dir).unwrap();
        let names: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.file.as_str()))
            .collect();
        assert_eq!(names, vec![("flask", "setup.py"), ("pytest", "setup.cfg")]);
    }

    #[test]
    fn test_setup_cfg_errors() {
        let dir = project(&[("setup.cfg", "install_requires = six\n")]);
        let err = extract(&dir).unwrap_err();
        assert_eq!(err.class_name(), "MissingSectionHeaderError");
    }

    #[test]
    fn test_empty_directory() {
        let dir = project(&[]);
        assert!(extract(&dir).unwrap().is_empty());
    }
}
