//! pyproject.toml dependency surfaces
//!
//! Reads PEP 621 `[project]` dependencies, PEP 735 `[dependency-groups]`,
//! `[build-system] requires` and `[tool.uv.sources]` path overrides, in
//! that order.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use toml::{Table, Value};

use super::requirement::Requirement;
use super::{DependencyRecord, Extractor};
use crate::error::ExtractError;

/// Extracts records from a single pyproject.toml
#[derive(Debug, Clone, Copy, Default)]
pub struct PyprojectExtractor;

impl PyprojectExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for PyprojectExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<DependencyRecord>, ExtractError> {
        let content = fs::read_to_string(path).map_err(|err| ExtractError::read(path, err))?;
        let document: Table =
            toml::from_str(&content).map_err(|err| ExtractError::toml(err.message()))?;

        let file = path.to_string_lossy().into_owned();
        let records = extract_document(&document, &file)?;
        tracing::info!(
            "Extracted {} dependencies from {}",
            records.len(),
            path.display()
        );
        Ok(records)
    }
}

/// Walk every dependency surface of a parsed document
pub fn extract_document(document: &Table, file: &str) -> Result<Vec<DependencyRecord>, ExtractError> {
    let mut records = Vec::new();

    if let Some(project) = document.get("project") {
        let project = expect_table(project, "project")?;

        if let Some(dependencies) = project.get("dependencies") {
            push_requirements(&mut records, dependencies, "project.dependencies", file)?;
        }

        if let Some(optional) = project.get("optional-dependencies") {
            let optional = expect_table(optional, "project.optional-dependencies")?;
            for (group, dependencies) in optional {
                let surface = format!("project.optional-dependencies.{group}");
                push_requirements(&mut records, dependencies, &surface, file)?;
            }
        }
    }

    if let Some(groups) = document.get("dependency-groups") {
        let groups = expect_table(groups, "dependency-groups")?;
        for group in groups.keys() {
            let mut visited = HashSet::new();
            resolve_group(groups, group, &mut visited, file, &mut records)?;
        }
    }

    if let Some(build_system) = document.get("build-system") {
        let build_system = expect_table(build_system, "build-system")?;
        if let Some(requires) = build_system.get("requires") {
            push_requirements(&mut records, requires, "build-system.requires", file)?;
        }
    }

    if let Some(sources) = uv_sources(document) {
        let sources = expect_table(sources, "tool.uv.sources")?;
        for (name, source) in sources {
            let Some(path) = source.as_table().and_then(|table| table.get("path")) else {
                continue;
            };
            let path = match path {
                Value::String(path) => path.clone(),
                other => other.to_string(),
            };
            records.push(DependencyRecord::path_override(name, &path, file));
        }
    }

    Ok(records)
}

fn uv_sources(document: &Table) -> Option<&Value> {
    document
        .get("tool")?
        .as_table()?
        .get("uv")?
        .as_table()?
        .get("sources")
}

fn expect_table<'a>(value: &'a Value, surface: &str) -> Result<&'a Table, ExtractError> {
    value.as_table().ok_or_else(|| {
        ExtractError::surface_type(format!(
            "{surface} must be a table, not {}",
            value.type_str()
        ))
    })
}

fn expect_array<'a>(value: &'a Value, surface: &str) -> Result<&'a [Value], ExtractError> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| {
        ExtractError::surface_type(format!(
            "{surface} must be an array, not {}",
            value.type_str()
        ))
    })
}

fn parse_entry(entry: &str, file: &str) -> Result<DependencyRecord, ExtractError> {
    let requirement = Requirement::parse(entry)?;
    Ok(DependencyRecord::from_requirement(&requirement, file))
}

fn push_requirements(
    records: &mut Vec<DependencyRecord>,
    value: &Value,
    surface: &str,
    file: &str,
) -> Result<(), ExtractError> {
    for entry in expect_array(value, surface)? {
        let entry = entry.as_str().ok_or_else(|| {
            ExtractError::surface_type(format!(
                "{surface} entries must be strings, not {}",
                entry.type_str()
            ))
        })?;
        records.push(parse_entry(entry, file)?);
    }
    Ok(())
}

/// Resolve one dependency group, following `include-group` entries.
///
/// A group already in `visited` contributes nothing, which both removes
/// duplicates and stops include cycles.
fn resolve_group(
    groups: &Table,
    name: &str,
    visited: &mut HashSet<String>,
    file: &str,
    records: &mut Vec<DependencyRecord>,
) -> Result<(), ExtractError> {
    if !visited.insert(name.to_string()) {
        tracing::debug!("Dependency group {} already resolved", name);
        return Ok(());
    }
    let Some(entries) = groups.get(name) else {
        tracing::debug!("Dependency group {} is not defined", name);
        return Ok(());
    };

    for entry in expect_array(entries, &format!("dependency-groups.{name}"))? {
        match entry {
            Value::String(requirement) => records.push(parse_entry(requirement, file)?),
            Value::Table(table) => {
                if let Some(included) = table.get("include-group").and_then(Value::as_str) {
                    resolve_group(groups, included, visited, file, records)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_str(content: &str) -> Result<Vec<DependencyRecord>, ExtractError> {
        let document: Table = toml::from_str(content).unwrap();
        extract_document(&document, "pyproject.toml")
    }

    fn names(records: &[DependencyRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_project_dependencies() {
        let records = extract_str(
            r#"
[project]
name = "demo"
dependencies = ["requests>=2.0"]
"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "requests");
        assert_eq!(records[0].version, None);
        assert_eq!(records[0].requirement.as_deref(), Some(">=2.0"));
        assert!(records[0].extras.is_empty());
        assert_eq!(records[0].markers, None);
        assert_eq!(records[0].file, "pyproject.toml");
    }

    #[test]
    fn test_surface_order() {
        let records = extract_str(
            r#"
[build-system]
requires = ["setuptools>=61"]

[project]
dependencies = ["alpha==1.0"]

[project.optional-dependencies]
zeta = ["beta[x,x]"]
docs = ["gamma ; python_version >= '3.9'"]

[dependency-groups]
dev = ["delta"]

[tool.uv.sources]
local = { path = "../local" }
remote = { git = "https://github.com/org/remote" }
"#,
        )
        .unwrap();
        assert_eq!(
            names(&records),
            vec!["alpha", "beta", "gamma", "delta", "setuptools", "local"]
        );
        assert_eq!(records[0].version.as_deref(), Some("1.0"));
        assert_eq!(records[1].extras, vec!["x"]);
        assert_eq!(
            records[2].markers.as_deref(),
            Some("python_version >= \"3.9\"")
        );
        assert_eq!(records[5].path_dependency, Some(true));
        assert_eq!(records[5].path.as_deref(), Some("../local"));
    }

    #[test]
    fn test_include_group_resolution() {
        let records = extract_str(
            r#"
[dependency-groups]
dev = ["pytest"]
test = [{include-group = "dev"}]
"#,
        )
        .unwrap();
        // each group resolves on its own: dev -> pytest, test -> pytest
        assert_eq!(names(&records), vec!["pytest", "pytest"]);
    }

    #[test]
    fn test_group_included_twice_contributes_once() {
        let records = extract_str(
            r#"
[dependency-groups]
dev = ["pytest"]
all = [{include-group = "dev"}, {include-group = "dev"}, "ruff"]
"#,
        )
        .unwrap();
        assert_eq!(names(&records), vec!["pytest", "pytest", "ruff"]);
    }

    #[test]
    fn test_cyclic_groups_terminate() {
        let records = extract_str(
            r#"
[dependency-groups]
a = ["one", {include-group = "b"}]
b = ["two", {include-group = "a"}, {include-group = "missing"}]
"#,
        )
        .unwrap();
        assert_eq!(names(&records), vec!["one", "two", "two", "one"]);
    }

    #[test]
    fn test_unknown_group_entries_are_ignored() {
        let records = extract_str(
            r#"
[dependency-groups]
dev = ["black", 42, {other = "x"}]
"#,
        )
        .unwrap();
        assert_eq!(names(&records), vec!["black"]);
    }

    #[test]
    fn test_invalid_requirement_aborts() {
        let err = extract_str(
            r#"
[project]
dependencies = ["ok", "bad>=1 x"]
"#,
        )
        .unwrap_err();
        assert_eq!(err.class_name(), "InvalidRequirement");
    }

    #[test]
    fn test_wrong_surface_type() {
        let err = extract_str(
            r#"
[project]
dependencies = "requests"
"#,
        )
        .unwrap_err();
        assert_eq!(err.class_name(), "TypeError");
    }

    #[test]
    fn test_extract_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(&path, "[project]\ndependencies = [\"attrs==23.1.0\"]\n").unwrap();

        let records = PyprojectExtractor::new().extract(&path).unwrap();
        assert_eq!(records[0].version.as_deref(), Some("23.1.0"));
        assert_eq!(records[0].file, path.to_string_lossy());
    }

    #[test]
    fn test_invalid_toml_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(&path, "[project\n").unwrap();
        let err = PyprojectExtractor::new().extract(&path).unwrap_err();
        assert_eq!(err.class_name(), "TOMLDecodeError");

        let err = PyprojectExtractor::new()
            .extract(&dir.path().join("absent.toml"))
            .unwrap_err();
        assert_eq!(err.class_name(), "FileNotFoundError");
    }
}
