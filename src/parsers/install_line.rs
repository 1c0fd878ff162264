//! pip-style install line classification
//!
//! An install line is what pip accepts on its command line or in a
//! requirements file: a PEP 508 specifier, a URL (optionally VCS), a local
//! directory or archive, or a wheel. Extractors only need the parsed
//! requirement and whether the line resolved to a link, so that is what
//! [`InstallLine`] keeps.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::DependencyRecord;
use super::marker::MarkerTree;
use super::requirement::{Operator, Requirement};
use crate::error::ExtractError;
use crate::utils::{absolutize, python_str_repr};

/// VCS backends pip registers, in registration order
const VCS_BACKENDS: [&str; 4] = ["bzr", "git", "hg", "svn"];

/// Every URL scheme the VCS backends claim
pub const VCS_SCHEMES: [&str; 23] = [
    "bzr+http",
    "bzr+https",
    "bzr+ssh",
    "bzr+sftp",
    "bzr+ftp",
    "bzr+lp",
    "bzr+file",
    "git+http",
    "git+https",
    "git+ssh",
    "git+git",
    "git+file",
    "hg+file",
    "hg+http",
    "hg+https",
    "hg+ssh",
    "hg+static-http",
    "svn",
    "svn+ssh",
    "svn+http",
    "svn+https",
    "svn+svn",
    "svn+file",
];

const ARCHIVE_EXTENSIONS: [&str; 13] = [
    ".zip", ".whl", ".tar.bz2", ".tbz", ".tar.gz", ".tgz", ".tar", ".tar.xz", ".txz", ".tlz",
    ".tar.lz", ".tar.lzma", ".jar",
];

static EXTRAS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)(\[[^\]]+\])$").expect("extras suffix regex"));

static EGG_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#&]egg=([^&]*)").expect("egg fragment regex"));

static WHEEL_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[^\s-]+?)-(?P<ver>[^\s-]*?)(?:-(?P<build>\d[^-]*?))?-(?P<pyver>[^\s-]+?)-(?P<abi>[^\s-]+?)-(?P<plat>[^\s-]+?)\.whl$",
    )
    .expect("wheel filename regex")
});

/// Lower-cased scheme, the text before the first `:`
fn url_scheme(text: &str) -> Option<String> {
    text.split_once(':').map(|(scheme, _)| scheme.to_lowercase())
}

/// Whether pip would treat the text as a URL rather than a specifier or path
pub fn is_url(text: &str) -> bool {
    url_scheme(text).is_some_and(|scheme| {
        matches!(scheme.as_str(), "http" | "https" | "file" | "ftp")
            || VCS_SCHEMES.contains(&scheme.as_str())
    })
}

fn looks_like_path(text: &str) -> bool {
    text.contains(std::path::MAIN_SEPARATOR) || text.contains('/') || text.starts_with('.')
}

fn is_archive_file(text: &str) -> bool {
    let lower = text.to_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_installable_dir(path: &Path) -> bool {
    path.join("setup.py").is_file() || path.join("pyproject.toml").is_file()
}

/// Split a trailing `[extras]` block off a path-like string
fn strip_extras(text: &str) -> (&str, Option<&str>) {
    match EXTRAS_SUFFIX.captures(text) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(base), Some(extras)) => (base.as_str(), Some(extras.as_str())),
            _ => (text, None),
        },
        None => (text, None),
    }
}

fn path_to_url(path: &Path) -> String {
    match Url::from_file_path(path) {
        Ok(url) => url.to_string(),
        Err(()) => format!("file://{}", path.display()),
    }
}

/// A URL an install line resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    url: String,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn is_file(&self) -> bool {
        url_scheme(&self.url).is_some_and(|scheme| scheme == "file")
    }

    pub fn is_vcs(&self) -> bool {
        url_scheme(&self.url).is_some_and(|scheme| VCS_SCHEMES.contains(&scheme.as_str()))
    }

    pub fn is_wheel(&self) -> bool {
        self.filename().ends_with(".whl")
    }

    /// Last path segment, without query or fragment
    pub fn filename(&self) -> String {
        if let Ok(parsed) = Url::parse(&self.url)
            && let Some(last) = parsed.path_segments().and_then(|mut segments| segments.next_back())
        {
            return last.to_string();
        }
        let without_fragment = self.url.split(['#', '?']).next().unwrap_or_default();
        without_fragment
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Project name from an `#egg=<name>` fragment
    pub fn egg_fragment(&self) -> Option<String> {
        let (_, fragment) = self.url.split_once('#')?;
        let fragment = format!("#{fragment}");
        EGG_FRAGMENT
            .captures(&fragment)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|egg| !egg.is_empty())
    }
}

/// A classified install line
#[derive(Debug, Clone)]
pub struct InstallLine {
    /// Parsed specifier, `None` for unnamed links
    pub requirement: Option<Requirement>,
    pub link: Option<Link>,
    /// Markers split off the line, falling back to the requirement's own
    pub markers: Option<MarkerTree>,
}

impl InstallLine {
    /// Classify a requirement line; relative paths resolve against `base_dir`.
    ///
    /// `source` names the declaring location (`line 3 of requirements.txt`)
    /// and is appended to specifier errors.
    pub fn parse(line: &str, base_dir: &Path, source: Option<&str>) -> Result<Self, ExtractError> {
        let separator = if is_url(line) { "; " } else { ";" };
        let (name, markers) = match line.split_once(separator) {
            Some((name, markers)) => {
                let markers = markers.trim();
                let markers = if markers.is_empty() {
                    None
                } else {
                    Some(MarkerTree::parse(markers)?)
                };
                (name.trim(), markers)
            }
            None => (line.trim(), None),
        };

        let link = if is_url(name) {
            Some(Link::new(name))
        } else {
            link_from_path(name, base_dir)?
        };

        let requirement_text = match &link {
            Some(link) if link.is_wheel() => Some(wheel_requirement(&link.filename())?),
            Some(link) => link.egg_fragment(),
            None => Some(name.to_string()),
        };

        let requirement = requirement_text
            .map(|text| parse_requirement_text(&text, base_dir, source))
            .transpose()?;
        let markers = markers.or_else(|| requirement.as_ref().and_then(|r| r.marker.clone()));
        // `name @ url` links like a bare URL does
        let link = link.or_else(|| {
            requirement
                .as_ref()
                .and_then(|r| r.url.as_deref())
                .map(Link::new)
        });

        Ok(Self {
            requirement,
            link,
            markers,
        })
    }

    /// Classify the argument of `-e` / `--editable`
    pub fn parse_editable(value: &str, base_dir: &Path) -> Result<Self, ExtractError> {
        let (without_extras, extras) = strip_extras(value);
        let local_dir = base_dir.join(without_extras);

        let file_url = if local_dir.is_dir() {
            Some(path_to_url(&absolutize(&local_dir)))
        } else if without_extras.to_lowercase().starts_with("file:") {
            Some(without_extras.to_string())
        } else {
            None
        };

        let (name, link) = match file_url {
            Some(url) => {
                let link = Link::new(url);
                let name = match (link.egg_fragment(), extras) {
                    (Some(egg), Some(extras)) => Some(format!("{egg}{}", extras.to_lowercase())),
                    (egg, _) => egg,
                };
                (name, link)
            }
            None => {
                let lower = value.to_lowercase();
                let url = VCS_BACKENDS
                    .iter()
                    .find(|backend| lower.starts_with(&format!("{backend}:")))
                    .map(|backend| format!("{backend}+{value}"))
                    .unwrap_or_else(|| value.to_string());
                let link = Link::new(url);
                if !link.is_vcs() {
                    return Err(ExtractError::installation(format!(
                        "{value} is not a valid editable requirement. It should either be a path to a local project or a VCS URL (beginning with {}).",
                        VCS_SCHEMES.join(", ")
                    )));
                }
                let Some(name) = link.egg_fragment() else {
                    return Err(ExtractError::installation(format!(
                        "Could not detect requirement name for '{value}', please specify one with #egg=your_package_name"
                    )));
                };
                (Some(name), link)
            }
        };

        let requirement = name
            .map(|name| {
                Requirement::parse(&name).map_err(|_| {
                    ExtractError::installation(format!("Invalid requirement: '{name}'"))
                })
            })
            .transpose()?;
        let markers = requirement.as_ref().and_then(|r| r.marker.clone());

        Ok(Self {
            requirement,
            link: Some(link),
            markers,
        })
    }

    pub fn is_file_link(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_file)
    }

    /// Build the output record, `None` for unnamed lines
    pub fn to_record(&self, file: impl Into<String>) -> Option<DependencyRecord> {
        let requirement = self.requirement.as_ref()?;
        Some(DependencyRecord::new(
            &requirement.name,
            &requirement.specifier,
            self.markers.as_ref(),
            &requirement.extras,
            file,
        ))
    }
}

fn link_from_path(name: &str, base_dir: &Path) -> Result<Option<Link>, ExtractError> {
    let (without_extras, _) = strip_extras(name);
    let path: PathBuf = absolutize(&base_dir.join(without_extras));

    if looks_like_path(name) && path.is_dir() {
        if is_installable_dir(&path) {
            return Ok(Some(Link::new(path_to_url(&path))));
        }
        return Err(ExtractError::installation(format!(
            "Directory {} is not installable. Neither 'setup.py' nor 'pyproject.toml' found.",
            python_str_repr(name)
        )));
    }

    if !is_archive_file(without_extras) {
        return Ok(None);
    }
    if path.is_file() {
        return Ok(Some(Link::new(path_to_url(&path))));
    }
    if let Some((before_at, _)) = name.split_once('@')
        && !looks_like_path(before_at)
    {
        return Ok(None);
    }
    tracing::warn!(
        "Requirement {} looks like a filename, but the file does not exist",
        python_str_repr(name)
    );
    Ok(Some(Link::new(path_to_url(&path))))
}

/// `name==version` derived from a wheel filename
fn wheel_requirement(filename: &str) -> Result<String, ExtractError> {
    let caps = WHEEL_FILENAME.captures(filename).ok_or_else(|| ExtractError::Installation {
        class: "InvalidWheelFilename",
        message: format!("{filename} is not a valid wheel filename."),
    })?;
    let name = caps.name("name").map_or("", |m| m.as_str()).replace('_', "-");
    let version = caps.name("ver").map_or("", |m| m.as_str()).replace('_', "-");
    Ok(format!("{name}=={version}"))
}

fn parse_requirement_text(
    text: &str,
    base_dir: &Path,
    source: Option<&str>,
) -> Result<Requirement, ExtractError> {
    let requirement = match Requirement::parse(text) {
        Ok(requirement) => requirement,
        Err(err) => {
            let hint = if text.contains('/') || text.contains(std::path::MAIN_SEPARATOR) {
                let mut hint = "It looks like a path.".to_string();
                if !base_dir.join(text).exists() {
                    hint.push_str(&format!(" File '{text}' does not exist."));
                }
                Some(hint)
            } else if text.contains('=') && !has_operator(text) {
                Some("= is not a valid operator. Did you mean == ?".to_string())
            } else {
                None
            };

            let mut message = with_source(
                format!("Invalid requirement: {}: {err}", python_str_repr(text)),
                source,
            );
            if let Some(hint) = hint {
                message.push_str(&format!("\nHint: {hint}"));
            }
            return Err(ExtractError::installation(message));
        }
    };

    if let Some(spec) = requirement
        .specifier
        .iter()
        .find(|spec| spec.operator == Operator::ArbitraryEqual && spec.version.ends_with(']'))
    {
        return Err(ExtractError::installation(format!(
            "Extras after version '{spec}'."
        )));
    }
    Ok(requirement)
}

fn has_operator(text: &str) -> bool {
    ["~=", "==", "!=", "<=", ">=", "<", ">", "==="]
        .iter()
        .any(|op| text.contains(op))
}

fn with_source(text: String, source: Option<&str>) -> String {
    match source {
        Some(source) => format!("{text} (from {source})"),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(line: &str) -> InstallLine {
        InstallLine::parse(line, Path::new("/nonexistent-base"), None).unwrap()
    }

    #[test]
    fn test_named_specifier() {
        let line = parse("foo[bar]>=1.0; python_version < '3.9'");
        let req = line.requirement.as_ref().unwrap();
        assert_eq!(req.name, "foo");
        assert!(line.link.is_none());
        assert_eq!(
            line.markers.as_ref().map(|m| m.to_string()),
            Some("python_version < \"3.9\"".to_string())
        );

        let record = line.to_record("requirements.txt").unwrap();
        assert_eq!(record.requirement.as_deref(), Some(">=1.0"));
        assert_eq!(record.extras, vec!["bar"]);
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/pkg.tar.gz"));
        assert!(is_url("git+https://github.com/org/repo.git"));
        assert!(is_url("svn://svn.example.com/repo"));
        assert!(!is_url("git://github.com/org/repo"));
        assert!(!is_url("foo>=1.0"));
    }

    #[test]
    fn test_direct_reference_is_link() {
        let line = parse("pkg @ git+https://github.com/org/pkg.git ; python_version >= '3.8'");
        assert_eq!(line.requirement.as_ref().unwrap().name, "pkg");
        let link = line.link.as_ref().unwrap();
        assert_eq!(link.as_str(), "git+https://github.com/org/pkg.git");
        assert!(link.is_vcs());
        assert!(line.markers.is_some());

        let line = parse("localpkg @ file:///opt/src/localpkg");
        assert!(line.is_file_link());
    }

    #[test]
    fn test_url_with_egg_is_named_link() {
        let line = parse("git+https://github.com/org/repo.git#egg=repo");
        assert_eq!(line.requirement.as_ref().unwrap().name, "repo");
        assert!(line.link.as_ref().unwrap().is_vcs());
        assert!(!line.is_file_link());
    }

    #[test]
    fn test_url_without_egg_is_unnamed() {
        let line = parse("https://example.com/archive/main.zip");
        assert!(line.requirement.is_none());
        assert!(line.to_record("x").is_none());
    }

    #[test]
    fn test_url_marker_separator_needs_space() {
        let line = parse("https://example.com/pkg.zip#egg=pkg; sys_platform == 'linux'");
        assert_eq!(line.link.as_ref().unwrap().as_str(), "https://example.com/pkg.zip#egg=pkg");
        assert!(line.markers.is_some());
    }

    #[test]
    fn test_wheel_link_is_pinned() {
        let line = parse("https://example.com/wheels/my_pkg-1.2.0-py3-none-any.whl");
        let req = line.requirement.as_ref().unwrap();
        assert_eq!(req.name, "my-pkg");
        assert_eq!(req.pinned_version(), Some("1.2.0"));
    }

    #[test]
    fn test_invalid_wheel_filename() {
        let err = InstallLine::parse(
            "https://example.com/broken.whl",
            Path::new("/nonexistent-base"),
            None,
        )
        .unwrap_err();
        assert_eq!(err.class_name(), "InvalidWheelFilename");
    }

    #[test]
    fn test_local_directory_is_file_link() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("localpkg")).unwrap();
        fs::write(dir.path().join("localpkg/setup.py"), "").unwrap();

        let line = InstallLine::parse("./localpkg", dir.path(), None).unwrap();
        assert!(line.is_file_link());
        assert!(line.requirement.is_none());
    }

    #[test]
    fn test_non_installable_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let err = InstallLine::parse("./empty", dir.path(), None).unwrap_err();
        assert_eq!(err.class_name(), "InstallationError");
        assert!(err.to_string().contains("is not installable"));
    }

    #[test]
    fn test_missing_archive_still_links() {
        let line = parse("./dist/pkg-1.0.tar.gz");
        assert!(line.is_file_link());
    }

    #[test]
    fn test_invalid_requirement_hints() {
        let err = InstallLine::parse("foo=1.0", Path::new("/nonexistent-base"), Some("line 2 of reqs.txt"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Invalid requirement: 'foo=1.0': "));
        assert!(message.contains("(from line 2 of reqs.txt)"));
        assert!(message.ends_with("Hint: = is not a valid operator. Did you mean == ?"));
    }

    #[test]
    fn test_invalid_marker_is_classified() {
        let err = InstallLine::parse("foo; bogus == '1'", Path::new("/nonexistent-base"), None)
            .unwrap_err();
        assert_eq!(err.class_name(), "InvalidMarker");
    }

    #[test]
    fn test_editable_vcs() {
        let line = InstallLine::parse_editable(
            "git+https://github.com/org/repo.git#egg=repo",
            Path::new("/nonexistent-base"),
        )
        .unwrap();
        assert!(line.link.as_ref().unwrap().is_vcs());
        assert_eq!(line.requirement.unwrap().name, "repo");

        let line = InstallLine::parse_editable(
            "git://github.com/org/repo.git#egg=repo",
            Path::new("/nonexistent-base"),
        )
        .unwrap();
        assert_eq!(line.link.unwrap().as_str(), "git+git://github.com/org/repo.git#egg=repo");
    }

    #[test]
    fn test_editable_errors() {
        let base = Path::new("/nonexistent-base");
        let err = InstallLine::parse_editable("not-a-thing", base).unwrap_err();
        assert!(err.to_string().contains("is not a valid editable requirement"));

        let err = InstallLine::parse_editable("git+https://github.com/org/repo.git", base).unwrap_err();
        assert!(err.to_string().starts_with("Could not detect requirement name"));
    }

    #[test]
    fn test_editable_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        let line = InstallLine::parse_editable("src", dir.path()).unwrap();
        assert!(line.is_file_link());
        assert!(line.requirement.is_none());
    }

    #[test]
    fn test_egg_fragment() {
        let link = Link::new("https://example.com/x.zip#sha256=abc&egg=thing");
        assert_eq!(link.egg_fragment().as_deref(), Some("thing"));
        assert_eq!(link.filename(), "x.zip");
    }
}
