//! Requirement list files (`*.txt`) and pip-compile inputs (`*.in`)
//!
//! Files are read with pip's requirements-file rules: continuation lines,
//! comments, `${VAR}` expansion, options, and `-r`/`-c` includes. Every
//! entry remembers the file that declared it so records can point at their
//! origin relative to the scan root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;
use walkdir::{DirEntry, WalkDir};

use super::install_line::InstallLine;
use super::{DependencyRecord, Extractor};
use crate::config::RequirementsConfig;
use crate::error::ExtractError;
use crate::utils::{absolutize, is_comment_line, python_str_repr, relative_path, strip_comment};

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:http|https|file):").expect("scheme regex"));

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("env var regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionTarget {
    Requirement,
    Constraint,
    Editable,
    Ignored,
}

struct OptionSpec {
    short: Option<&'static str>,
    long: &'static str,
    takes_value: bool,
    target: OptionTarget,
}

const fn option(
    short: Option<&'static str>,
    long: &'static str,
    takes_value: bool,
    target: OptionTarget,
) -> OptionSpec {
    OptionSpec {
        short,
        long,
        takes_value,
        target,
    }
}

/// Options pip accepts inside a requirements file
const OPTIONS: &[OptionSpec] = &[
    option(Some("-r"), "--requirement", true, OptionTarget::Requirement),
    option(Some("-c"), "--constraint", true, OptionTarget::Constraint),
    option(Some("-e"), "--editable", true, OptionTarget::Editable),
    option(Some("-i"), "--index-url", true, OptionTarget::Ignored),
    option(None, "--extra-index-url", true, OptionTarget::Ignored),
    option(None, "--no-index", false, OptionTarget::Ignored),
    option(Some("-f"), "--find-links", true, OptionTarget::Ignored),
    option(None, "--pre", false, OptionTarget::Ignored),
    option(None, "--trusted-host", true, OptionTarget::Ignored),
    option(None, "--prefer-binary", false, OptionTarget::Ignored),
    option(None, "--require-hashes", false, OptionTarget::Ignored),
    option(None, "--only-binary", true, OptionTarget::Ignored),
    option(None, "--no-binary", true, OptionTarget::Ignored),
    option(None, "--use-feature", true, OptionTarget::Ignored),
    option(None, "--hash", true, OptionTarget::Ignored),
    option(None, "--config-settings", true, OptionTarget::Ignored),
    option(None, "--global-option", true, OptionTarget::Ignored),
    option(None, "--install-option", true, OptionTarget::Ignored),
];

#[derive(Debug, Default)]
struct LineOptions {
    requirements: Vec<String>,
    constraints: Vec<String>,
    editables: Vec<String>,
}

/// A requirement line together with where it was declared
#[derive(Debug, Clone)]
struct ParsedRequirement {
    requirement: String,
    editable: bool,
    /// File (or URL) that declared the line, as pip names it
    origin: String,
    line_number: usize,
}

/// Extracts records from every requirement list under a directory
#[derive(Debug, Clone, Default)]
pub struct RequirementsExtractor {
    config: RequirementsConfig,
}

impl RequirementsExtractor {
    pub fn new(config: RequirementsConfig) -> Self {
        Self { config }
    }

    /// List files in scan order: root then subdirectories, plain lists
    /// before compile inputs, each group sorted by path.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let mut top_level = Vec::new();
        let mut nested = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(2)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!("Skipping unreadable entry during discovery: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.depth() == 1 {
                top_level.push(entry.into_path());
            } else {
                nested.push(entry.into_path());
            }
        }

        let mut files = Vec::new();
        for suffixes in [&self.config.list_suffixes, &self.config.compile_suffixes] {
            for group in [&top_level, &nested] {
                let mut matching: Vec<PathBuf> = group
                    .iter()
                    .filter(|path| has_suffix(path, suffixes))
                    .cloned()
                    .collect();
                matching.sort();
                files.extend(matching);
            }
        }
        files
    }
}

impl Extractor for RequirementsExtractor {
    fn extract(&self, root: &Path) -> Result<Vec<DependencyRecord>, ExtractError> {
        let mut records = Vec::new();

        for file in self.discover(root) {
            tracing::debug!("Parsing requirements file {}", file.display());
            let mut parsed = Vec::new();
            let mut stack = Vec::new();
            parse_and_recurse(&file.to_string_lossy(), &mut stack, &mut parsed)?;

            for entry in parsed {
                let line = if entry.editable {
                    InstallLine::parse_editable(&entry.requirement, root)?
                } else {
                    let source = format!("line {} of {}", entry.line_number, entry.origin);
                    InstallLine::parse(&entry.requirement, root, Some(&source))?
                };

                if line.is_file_link() {
                    tracing::debug!("Skipping local file requirement {}", entry.requirement);
                    continue;
                }
                if !is_local_file(&entry.origin) {
                    tracing::debug!(
                        "Skipping {} declared in non-local file {}",
                        entry.requirement,
                        entry.origin
                    );
                    continue;
                }

                let file = relative_path(Path::new(&entry.origin), root);
                match line.to_record(file) {
                    Some(record) => records.push(record),
                    None => tracing::debug!("Skipping unnamed requirement {}", entry.requirement),
                }
            }
        }

        tracing::info!(
            "Extracted {} dependencies from requirement files in {}",
            records.len(),
            root.display()
        );
        Ok(records)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_suffix(path: &Path, suffixes: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy())
        .is_some_and(|ext| suffixes.iter().any(|suffix| *suffix == ext))
}

fn is_local_file(origin: &str) -> bool {
    !SCHEME.is_match(origin) && Path::new(origin).is_file()
}

/// Key used to detect include cycles: local paths compare lexically normalized
fn include_key(filename: &str) -> String {
    if SCHEME.is_match(filename) {
        filename.to_string()
    } else {
        absolutize(Path::new(filename)).to_string_lossy().into_owned()
    }
}

fn parse_and_recurse(
    filename: &str,
    stack: &mut Vec<String>,
    out: &mut Vec<ParsedRequirement>,
) -> Result<(), ExtractError> {
    let Some(content) = read_content(filename)? else {
        return Ok(());
    };
    stack.push(include_key(filename));

    for (line_number, line) in preprocess(&content) {
        let (args, options) = parse_line(&line).map_err(|message| {
            ExtractError::requirements_file(format!("Invalid requirement: {line}\n{message}"))
        })?;

        if !args.is_empty() {
            out.push(ParsedRequirement {
                requirement: args,
                editable: false,
                origin: filename.to_string(),
                line_number,
            });
        } else if let Some(editable) = options.editables.into_iter().next() {
            out.push(ParsedRequirement {
                requirement: editable,
                editable: true,
                origin: filename.to_string(),
                line_number,
            });
        } else if let Some(include) = options
            .requirements
            .into_iter()
            .next()
            .or_else(|| options.constraints.into_iter().next())
        {
            let target = resolve_include(filename, &include);
            if stack.contains(&include_key(&target)) {
                return Err(ExtractError::requirements_file(format!(
                    "{target} recursively references itself in {filename}"
                )));
            }
            parse_and_recurse(&target, stack, out)?;
        }
    }

    stack.pop();
    Ok(())
}

/// Join an include to its parent unless either side is a URL
fn resolve_include(parent: &str, include: &str) -> String {
    if SCHEME.is_match(parent) {
        return Url::parse(parent)
            .and_then(|base| base.join(include))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| include.to_string());
    }
    if SCHEME.is_match(include) {
        return include.to_string();
    }
    let parent_dir = Path::new(parent).parent().unwrap_or_else(|| Path::new(""));
    parent_dir.join(include).to_string_lossy().into_owned()
}

/// Read a requirements file; remote files are never fetched and yield `None`.
fn read_content(filename: &str) -> Result<Option<String>, ExtractError> {
    let path = if SCHEME.is_match(filename) {
        let url = Url::parse(filename).map_err(|err| {
            ExtractError::installation(format!(
                "Could not open requirements file: {err}: {}",
                python_str_repr(filename)
            ))
        })?;
        if url.scheme() != "file" {
            tracing::debug!("Not fetching remote requirements file {}", filename);
            return Ok(None);
        }
        url.to_file_path().map_err(|()| {
            ExtractError::installation(format!(
                "Could not open requirements file: invalid file URL: {}",
                python_str_repr(filename)
            ))
        })?
    } else {
        PathBuf::from(filename)
    };

    let bytes = fs::read(&path).map_err(|err| {
        ExtractError::installation(format!(
            "Could not open requirements file: {err}: {}",
            python_str_repr(&path.to_string_lossy())
        ))
    })?;
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(&bytes);
    let content = std::str::from_utf8(bytes).map_err(|err| {
        ExtractError::read(
            &path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })?;
    Ok(Some(content.to_string()))
}

/// Continuation joining, comment stripping and `${VAR}` expansion
fn preprocess(content: &str) -> Vec<(usize, String)> {
    join_lines(content)
        .into_iter()
        .filter_map(|(number, line)| {
            let line = strip_comment(&line).trim().to_string();
            (!line.is_empty()).then(|| (number, expand_env_variables(&line)))
        })
        .collect()
}

fn join_lines(content: &str) -> Vec<(usize, String)> {
    let mut joined = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut primary = 0;

    for (index, line) in content.lines().enumerate() {
        let number = index + 1;
        let comment = is_comment_line(line);
        if !line.ends_with('\\') || comment {
            // Prefixing keeps a joined comment recognizable to strip_comment.
            let line = if comment {
                format!(" {line}")
            } else {
                line.to_string()
            };
            if pending.is_empty() {
                joined.push((number, line));
            } else {
                pending.push(line);
                joined.push((primary, pending.concat()));
                pending.clear();
            }
        } else {
            if pending.is_empty() {
                primary = number;
            }
            pending.push(line.trim_matches('\\').to_string());
        }
    }
    if !pending.is_empty() {
        joined.push((primary, pending.concat()));
    }
    joined
}

/// Replace `${NAME}` with the environment value; unset or empty stay as-is.
fn expand_env_variables(line: &str) -> String {
    let mut expanded = line.to_string();
    for caps in ENV_VAR.captures_iter(line) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        match std::env::var(name.as_str()) {
            Ok(value) if !value.is_empty() => {
                expanded = expanded.replace(whole.as_str(), &value);
            }
            _ => {}
        }
    }
    expanded
}

/// Split a line into its requirement part and parsed options.
///
/// The requirement part ends at the first space-separated token starting
/// with `-`.
fn parse_line(line: &str) -> Result<(String, LineOptions), String> {
    let tokens: Vec<&str> = line.split(' ').collect();
    let split = tokens
        .iter()
        .position(|token| token.starts_with('-'))
        .unwrap_or(tokens.len());
    let args = tokens[..split].join(" ");
    let option_text = tokens[split..].join(" ");
    let options = parse_options(option_text.split_whitespace())?;
    Ok((args, options))
}

fn parse_options<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<LineOptions, String> {
    let mut options = LineOptions::default();
    let mut tokens = tokens.peekable();

    while let Some(token) = tokens.next() {
        let (spec, inline_value, display) = if let Some(long) = token.strip_prefix("--") {
            if long.is_empty() {
                continue;
            }
            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (token, None),
            };
            let spec = OPTIONS
                .iter()
                .find(|spec| spec.long == name)
                .ok_or_else(|| format!("no such option: {name}"))?;
            if !spec.takes_value && value.is_some() {
                return Err(format!("{name} option does not take a value"));
            }
            (spec, value, name)
        } else if token.len() > 1 && token.starts_with('-') {
            let split = token
                .char_indices()
                .nth(2)
                .map_or(token.len(), |(index, _)| index);
            let (short, rest) = token.split_at(split);
            let spec = OPTIONS
                .iter()
                .find(|spec| spec.short == Some(short))
                .ok_or_else(|| format!("no such option: {short}"))?;
            let value = (!rest.is_empty()).then(|| rest.to_string());
            (spec, value, short)
        } else {
            continue;
        };

        if !spec.takes_value {
            continue;
        }
        let value = match inline_value {
            Some(value) => value,
            None => tokens
                .next()
                .map(str::to_string)
                .ok_or_else(|| format!("{display} option requires 1 argument"))?,
        };
        match spec.target {
            OptionTarget::Requirement => options.requirements.push(value),
            OptionTarget::Constraint => options.constraints.push(value),
            OptionTarget::Editable => options.editables.push(value),
            OptionTarget::Ignored => {}
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(root: &Path) -> Result<Vec<DependencyRecord>, ExtractError> {
        RequirementsExtractor::default().extract(root)
    }

    #[test]
    fn test_join_lines() {
        let joined = join_lines("foo \\\n>=1.0\nbar\n# note \\\nbaz");
        assert_eq!(
            joined,
            vec![
                (1, "foo >=1.0".to_string()),
                (3, "bar".to_string()),
                (4, " # note \\".to_string()),
                (5, "baz".to_string()),
            ]
        );
    }

    #[test]
    fn test_preprocess_strips_comments_and_blank_lines() {
        let lines = preprocess("foo==1.2.3  # pinned\n\n   \n# comment\nbar");
        assert_eq!(
            lines,
            vec![(1, "foo==1.2.3".to_string()), (5, "bar".to_string())]
        );
    }

    #[test]
    fn test_expand_env_variables_leaves_unset() {
        assert_eq!(
            expand_env_variables("pkg @ https://${DEPENDI_PYTHON_SURELY_UNSET_VAR}/pkg.zip"),
            "pkg @ https://${DEPENDI_PYTHON_SURELY_UNSET_VAR}/pkg.zip"
        );
    }

    #[test]
    fn test_parse_line_options() {
        let (args, options) = parse_line("-r base.txt").unwrap();
        assert!(args.is_empty());
        assert_eq!(options.requirements, vec!["base.txt"]);

        let (_, options) = parse_line("-cconstraints.txt").unwrap();
        assert_eq!(options.constraints, vec!["constraints.txt"]);

        let (_, options) = parse_line("--requirement=other.txt").unwrap();
        assert_eq!(options.requirements, vec!["other.txt"]);

        let (args, _) = parse_line("foo==1.0 --hash=sha256:abcd --hash sha256:ef01").unwrap();
        assert_eq!(args, "foo==1.0");

        let (args, options) = parse_line("--index-url https://pypi.org/simple --pre").unwrap();
        assert!(args.is_empty());
        assert!(options.requirements.is_empty());
    }

    #[test]
    fn test_parse_line_errors() {
        assert_eq!(
            parse_line("--bogus").unwrap_err(),
            "no such option: --bogus"
        );
        assert_eq!(parse_line("-r").unwrap_err(), "-r option requires 1 argument");
        assert_eq!(
            parse_line("--pre=yes").unwrap_err(),
            "--pre option does not take a value"
        );
    }

    #[test]
    fn test_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("requirements")).unwrap();
        fs::create_dir(root.join(".hidden")).unwrap();
        fs::create_dir(root.join("deep")).unwrap();
        fs::create_dir(root.join("deep/deeper")).unwrap();
        for file in [
            "b.txt",
            "a.txt",
            "requirements/dev.txt",
            "requirements.in",
            "requirements/test.in",
            ".hidden/x.txt",
            ".dotfile.txt",
            "deep/deeper/too-deep.txt",
            "notes.md",
        ] {
            fs::write(root.join(file), "").unwrap();
        }

        let found: Vec<String> = RequirementsExtractor::default()
            .discover(root)
            .iter()
            .map(|path| relative_path(path, root))
            .collect();
        assert_eq!(
            found,
            vec![
                "a.txt",
                "b.txt",
                "requirements/dev.txt",
                "requirements.in",
                "requirements/test.in"
            ]
        );
    }

    #[test]
    fn test_pinned_requirement_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "foo==1.2.3  # pinned\n").unwrap();

        let records = extract(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "foo");
        assert_eq!(records[0].version.as_deref(), Some("1.2.3"));
        assert_eq!(records[0].requirement.as_deref(), Some("==1.2.3"));
        assert_eq!(records[0].file, "requirements.txt");
        assert!(records[0].markers.is_none());
    }

    #[test]
    fn test_include_keeps_origin() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("reqs")).unwrap();
        fs::write(root.join("requirements.txt"), "-r reqs/base.txt\nflask\n").unwrap();
        fs::write(root.join("reqs/base.txt"), "requests>=2\n").unwrap();

        let records = extract(root).unwrap();
        let summary: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.file.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("requests", "reqs/base.txt"),
                ("flask", "requirements.txt"),
                ("requests", "reqs/base.txt"),
            ]
        );
    }

    #[test]
    fn test_remote_include_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("requirements.txt"),
            "-c https://example.com/constraints.txt\nfoo\n",
        )
        .unwrap();

        let records = extract(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "foo");
    }

    #[test]
    fn test_file_url_include_is_not_local_origin() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        fs::create_dir(&shared).unwrap();
        fs::write(shared.join("extra.cfg"), "bar==2.0\n").unwrap();
        let url = Url::from_file_path(absolutize(&shared.join("extra.cfg"))).unwrap();
        fs::write(
            dir.path().join("requirements.txt"),
            format!("-r {url}\nfoo\n"),
        )
        .unwrap();

        let records = extract(dir.path()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["foo"]);
    }

    #[test]
    fn test_include_cycle_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "-r b.txt\n").unwrap();
        fs::write(dir.path().join("b.txt"), "-r ./a.txt\n").unwrap();

        let err = extract(dir.path()).unwrap_err();
        assert_eq!(err.class_name(), "RequirementsFileParseError");
        assert!(err.to_string().contains("recursively references itself"));
    }

    #[test]
    fn test_missing_include_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "-r missing.txt\n").unwrap();

        let err = extract(dir.path()).unwrap_err();
        assert_eq!(err.class_name(), "InstallationError");
        assert!(err.to_string().starts_with("Could not open requirements file: "));
    }

    #[test]
    fn test_unknown_option_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "--frobnicate\n").unwrap();

        let err = extract(dir.path()).unwrap_err();
        assert_eq!(
            err.repr(),
            "RequirementsFileParseError('Invalid requirement: --frobnicate\\nno such option: --frobnicate')"
        );
    }

    #[test]
    fn test_links_and_editables() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("localpkg")).unwrap();
        fs::write(root.join("localpkg/pyproject.toml"), "").unwrap();
        fs::write(
            root.join("requirements.txt"),
            "./localpkg\n\
             -e git+https://github.com/org/tool.git#egg=tool\n\
             https://example.com/archive.zip\n\
             ./dist/thing-1.0.tar.gz\n\
             pkg[b,a]>=1; python_version < '3.10'\n",
        )
        .unwrap();

        let records = extract(root).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "tool");
        assert!(records[0].requirement.is_none());
        assert_eq!(records[1].name, "pkg");
        assert_eq!(records[1].extras, vec!["a", "b"]);
        assert_eq!(
            records[1].markers.as_deref(),
            Some("python_version < \"3.10\"")
        );
    }

    #[test]
    fn test_direct_references() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("requirements.txt"),
            "six\nlocalpkg @ file:///opt/src/localpkg\nremote @ git+https://github.com/org/remote.git\n",
        )
        .unwrap();

        let records = extract(dir.path()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["six", "remote"]);
        assert!(records[1].requirement.is_none());
    }

    #[test]
    fn test_bom_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), b"\xef\xbb\xbfsix\n").unwrap();

        let records = extract(dir.path()).unwrap();
        assert_eq!(records[0].name, "six");
    }
}
