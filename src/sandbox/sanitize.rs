//! Source rewrites applied before a setup script is evaluated

use std::sync::LazyLock;

use regex::Regex;

static PRINT_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprint\s*\(").expect("print call regex"));

static LOG_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blog\s*(\.\w+)*\(").expect("log call regex"));

static OPEN_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+\.)*(open|file)\s*\(").expect("open call regex"));

static VERSION_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.*import.*__version__.*$").expect("version import regex"));

/// Redirect output, logging, file access and requirement-file parsing to
/// the sandbox stand-ins, and blank out `__version__` imports.
pub fn sanitize(source: &str) -> String {
    let source = PRINT_CALL.replace_all(source, "noop(");
    let source = LOG_CALL.replace_all(&source, "noop(");
    let source = OPEN_CALL.replace_all(&source, "fake_open(");
    let source = source.replace("parse_requirements(", "fake_parse(");
    VERSION_IMPORT.replace_all(&source, "").into_owned()
}
