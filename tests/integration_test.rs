//! Integration tests for dependi-python

use std::fs;
use std::path::Path;

use dependi_python::config::Config;
use dependi_python::{
    DependencyRecord, Envelope, extract_pyproject, extract_requirements_with, extract_setup_with,
};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn requirements(dir: &Path) -> Vec<DependencyRecord> {
    extract_requirements_with(dir, &Config::default()).unwrap()
}

fn setup(dir: &Path) -> Vec<DependencyRecord> {
    extract_setup_with(dir, &Config::default()).unwrap()
}

/// `project.dependencies = ["requests>=2.0"]`
#[test]
fn test_pyproject_project_dependencies() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "pyproject.toml",
        r#"
[project]
name = "demo"
version = "0.1.0"
dependencies = ["requests>=2.0"]
"#,
    );

    let records = extract_pyproject(dir.path().join("pyproject.toml")).unwrap();
    assert_eq!(records.len(), 1);

    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json["name"], "requests");
    assert!(json["version"].is_null());
    assert_eq!(json["requirement"], ">=2.0");
    assert_eq!(json["extras"], serde_json::json!([]));
    assert!(json["markers"].is_null());
}

/// A pinned list entry with a trailing comment
#[test]
fn test_requirements_pinned_entry() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "foo==1.2.3  # pinned\n");

    let records = requirements(dir.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "foo");
    assert_eq!(records[0].version.as_deref(), Some("1.2.3"));
    assert_eq!(records[0].requirement.as_deref(), Some("==1.2.3"));
    assert!(records[0].extras.is_empty());
    assert!(records[0].markers.is_none());
    assert_eq!(records[0].file, "requirements.txt");
}

/// `test` includes `dev`: each group yields `pytest` exactly once
#[test]
fn test_dependency_group_includes() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "pyproject.toml",
        r#"
[dependency-groups]
dev = ["pytest"]
test = [{include-group = "dev"}]
"#,
    );

    let records = extract_pyproject(dir.path().join("pyproject.toml")).unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["pytest", "pytest"]);
}

/// `setup(install_requires=["click>=7"])`
#[test]
fn test_setup_py_install_requires() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "setup.py",
        "from setuptools import setup\n\nsetup(install_requires=[\"click>=7\"])\n",
    );

    let records = setup(dir.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "click");
    assert_eq!(records[0].requirement.as_deref(), Some(">=7"));
    assert_eq!(records[0].requirement_type.as_deref(), Some("install_requires"));
    assert_eq!(records[0].file, "setup.py");
}

#[test]
fn test_requirements_discovery_order_and_includes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "base.txt", "six\n");
    write(
        dir.path(),
        "requirements.txt",
        "-r base.txt\n-r https://example.com/remote.txt\nrequests[security,socks]>=2 ; python_version >= \"3.8\"\n",
    );
    write(dir.path(), "requirements.in", "flask\n");
    write(dir.path(), "nested/dev.txt", "pytest==8.0.0\n");
    write(dir.path(), ".hidden/ignored.txt", "ignored\n");

    let records = requirements(dir.path());
    let summary: Vec<(&str, &str)> = records
        .iter()
        .map(|r| (r.name.as_str(), r.file.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("six", "base.txt"),
            ("six", "base.txt"),
            ("requests", "requirements.txt"),
            ("pytest", "nested/dev.txt"),
            ("flask", "requirements.in"),
        ]
    );

    let requests = &records[2];
    assert_eq!(requests.extras, vec!["security", "socks"]);
    assert_eq!(requests.markers.as_deref(), Some("python_version >= \"3.8\""));
    assert!(requests.version.is_none());
}

#[test]
fn test_requirements_unknown_option_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "--bogus-option\n");

    let err = extract_requirements_with(dir.path(), &Config::default()).unwrap_err();
    let envelope = Envelope::from_result(Err(err));
    let json = envelope.to_json().unwrap();
    assert!(json.starts_with(r#"{"error":"RequirementsFileParseError("#));
}

#[test]
fn test_setup_py_evaluation_has_no_side_effects() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "setup.py",
        r#"
import os
import subprocess
import sys
from setuptools import setup

with open("pwned.txt", "w") as f:
    f.write("should never reach the disk")
os.system("touch pwned-by-system")
subprocess.call(["touch", "pwned-by-subprocess"])

home = os.environ.get("HOME")
token = os.getenv("SECRET_TOKEN", "unset")
print("evaluating", home, token)

setup(
    install_requires=["requests"] if home is None and token == "unset" else ["leaked"],
    tests_require=["pytest"] if sys.version_info >= (3, 0) else [],
)
"#,
    );

    let records = setup(dir.path());
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["requests", "pytest"]);

    let entries: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["setup.py"]);
}

#[test]
fn test_setup_py_version_from_package_file() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "setup.py",
        r#"
import re
from setuptools import setup, find_packages
from mypkg import __version__

def read(*parts):
    with open(os.path.join(*parts)) as fp:
        return fp.read()

import os
VERSION_FILE = read("mypkg", "__init__.py")
version = VERSION_FILE.split("__version__ = '")[1].split("'")[0]

setup(
    name="mypkg",
    version=version,
    packages=find_packages(exclude=["tests"]),
    install_requires=[
        "mypkg-core==" + version,
        "attrs>=19.1",  # core
    ],
    extras_require={
        "docs": ["sphinx"],
        "all": ["sphinx", "uvloop; sys_platform != 'win32'"],
    },
)
"#,
    );

    let records = setup(dir.path());
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
            ("mypkg-core", Some("0.0.1+placeholder"), Some("install_requires")),
            ("attrs", None, Some("install_requires")),
            ("sphinx", None, Some("extras_require:docs")),
            ("sphinx", None, Some("extras_require:all")),
            ("uvloop", None, Some("extras_require:all")),
        ]
    );
    assert_eq!(
        records[4].markers.as_deref(),
        Some("sys_platform != \"win32\"")
    );
}

#[test]
fn test_setup_py_syntax_error_envelope() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "setup.py", "setup(install_requires=[\n");

    let err = extract_setup_with(dir.path(), &Config::default()).unwrap_err();
    assert_eq!(err.class_name(), "SyntaxError");
    let envelope = Envelope::from_result(Err(err));
    assert!(envelope.is_error());
}

#[test]
fn test_setup_py_step_budget() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "setup.py", "while True:\n    pass\n");

    let mut config = Config::default();
    config.setup.sandbox.step_limit = 10_000;
    let err = extract_setup_with(dir.path(), &config).unwrap_err();
    assert_eq!(err.class_name(), "RuntimeError");
}

#[test]
fn test_pyproject_path_overrides() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "pyproject.toml",
        r#"
[project]
dependencies = ["local-lib", "httpx[http2]==0.27.0"]

[tool.uv.sources]
local-lib = { path = "../local-lib", editable = true }
other = { git = "https://github.com/org/other" }
"#,
    );

    let records = extract_pyproject(dir.path().join("pyproject.toml")).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].extras, vec!["http2"]);
    assert_eq!(records[1].version.as_deref(), Some("0.27.0"));

    let path_override = &records[2];
    assert_eq!(path_override.name, "local-lib");
    assert_eq!(path_override.path_dependency, Some(true));
    assert_eq!(path_override.path.as_deref(), Some("../local-lib"));
    assert!(path_override.requirement.is_none());
}

#[test]
fn test_result_envelope_shape() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "foo==1.2.3\n");

    let envelope = Envelope::from_result(extract_requirements_with(dir.path(), &Config::default()));
    let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
    let record = json["result"][0].as_object().unwrap();
    let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "extras",
            "file",
            "markers",
            "name",
            "path",
            "path_dependency",
            "requirement",
            "requirement_type",
            "version",
        ]
    );
}

fn run_binary(args: &[&str]) -> (serde_json::Value, Option<i32>) {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_dependi-python"))
        .args(args)
        .env("RUST_LOG", "off")
        .env_remove(dependi_python::config::OPTIONS_ENV)
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1, "stdout must be one JSON line: {stdout:?}");
    (serde_json::from_str(&stdout).unwrap(), output.status.code())
}

#[test]
fn test_binary_reports_classified_error() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "pyproject.toml",
        "[project]\nname = \"demo\"\ndependencies = [\"foo>=1 bar\"]\n",
    );
    let manifest = dir.path().join("pyproject.toml");

    let (json, code) = run_binary(&["pyproject", manifest.to_str().unwrap()]);
    assert_eq!(code, Some(1));
    assert!(json.get("result").is_none());
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .starts_with("InvalidRequirement(")
    );
}

#[test]
fn test_binary_missing_directory_is_empty_result() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing");

    let (json, code) = run_binary(&["requirements", missing.to_str().unwrap()]);
    assert_eq!(code, Some(0));
    assert_eq!(json, serde_json::json!({ "result": [] }));
}

#[test]
fn test_binary_prints_records() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "setup.cfg", "[options]\ninstall_requires = six==1.16.0\n");

    let (json, code) = run_binary(&["setup", dir.path().to_str().unwrap()]);
    assert_eq!(code, Some(0));
    assert_eq!(json["result"][0]["name"], "six");
    assert_eq!(json["result"][0]["version"], "1.16.0");
    assert_eq!(json["result"][0]["requirement_type"], "install_requires");
}
