//! PEP 508 dependency specifier parsing
//!
//! Parses strings such as `foo[extra1,extra2]>=1.0; python_version>='3.8'`
//! into name, extras, specifier set, URL and marker. Normalization follows
//! the `packaging` library that Python build tools use, so the rendered
//! specifier and marker strings match what those tools would print.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::marker::{self, MarkerTree};

const PRE: &str = r"(?:[-_.]?(?:alpha|beta|preview|pre|a|b|c|rc)[-_.]?[0-9]*)?";
const POST: &str = r"(?:(?:-[0-9]+)|(?:[-_.]?(?:post|rev|r)[-_.]?[0-9]*))?";
const DEV: &str = r"(?:[-_.]?dev[-_.]?[0-9]*)?";
const LOCAL: &str = r"(?:\+[a-z0-9]+(?:[-_.][a-z0-9]+)*)?";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*\b").expect("identifier regex"));

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^ \t]+").expect("url regex"));

/// `==` and `!=` accept prefix wildcards and local labels.
static EQUALITY_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*v?(?:[0-9]+!)?[0-9]+(?:\.[0-9]+)*(?:\.\*|{PRE}{POST}{DEV}{LOCAL})?"
    ))
    .expect("equality version regex")
});

/// `~=` needs at least two release components.
static COMPATIBLE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*v?(?:[0-9]+!)?[0-9]+(?:\.[0-9]+)+{PRE}{POST}{DEV}"
    ))
    .expect("compatible version regex")
});

static ORDERED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*v?(?:[0-9]+!)?[0-9]+(?:\.[0-9]+)*{PRE}{POST}{DEV}"
    ))
    .expect("ordered version regex")
});

/// `===` compares strings, anything up to a delimiter is accepted.
static ARBITRARY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[^\s;),]+").expect("arbitrary version regex"));

static PREFIX_TRAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.\*").expect("prefix trail regex"));

static LOCAL_TRAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\+[a-z0-9]+(?:[-_.][a-z0-9]+)*").expect("local trail regex")
});

/// Which grammar a [`RequirementError`] was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Requirement,
    Marker,
}

/// A classified specifier syntax error with the offending position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementError {
    pub kind: SyntaxKind,
    pub message: String,
    pub text: String,
    /// Byte offset into `text` where parsing stopped
    pub position: usize,
}

impl RequirementError {
    /// Python exception class this error corresponds to
    pub fn class_name(&self) -> &'static str {
        match self.kind {
            SyntaxKind::Requirement => "InvalidRequirement",
            SyntaxKind::Marker => "InvalidMarker",
        }
    }
}

impl fmt::Display for RequirementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset = self
            .text
            .get(..self.position)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        write!(
            f,
            "{}\n    {}\n    {}^",
            self.message,
            self.text,
            " ".repeat(offset)
        )
    }
}

impl std::error::Error for RequirementError {}

/// Byte cursor shared by the requirement and marker grammars
pub(crate) struct Cursor<'a> {
    text: &'a str,
    pub(crate) pos: usize,
    kind: SyntaxKind,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(text: &'a str, kind: SyntaxKind) -> Self {
        Self { text, pos: 0, kind }
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Skip spaces and tabs, returning whether anything was skipped
    pub(crate) fn eat_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
        self.pos > start
    }

    pub(crate) fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume an anchored regex match
    pub(crate) fn eat_regex(&mut self, re: &Regex) -> Option<&'a str> {
        let rest = self.rest();
        let found = re.find(rest)?;
        if found.start() != 0 || found.is_empty() {
            return None;
        }
        self.pos += found.end();
        Some(&rest[..found.end()])
    }

    pub(crate) fn check_regex(&self, re: &Regex) -> bool {
        re.find(self.rest())
            .is_some_and(|m| m.start() == 0 && !m.is_empty())
    }

    pub(crate) fn identifier(&mut self) -> Option<&'a str> {
        self.eat_regex(&IDENTIFIER)
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> RequirementError {
        RequirementError {
            kind: self.kind,
            message: message.into(),
            text: self.text.to_string(),
            position: self.pos,
        }
    }
}

/// Comparison operator of a single version specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Compatible,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    ArbitraryEqual,
}

/// Longest operators first so `===` wins over `==`
const OPERATORS: [(&str, Operator); 8] = [
    ("===", Operator::ArbitraryEqual),
    ("==", Operator::Equal),
    ("~=", Operator::Compatible),
    ("!=", Operator::NotEqual),
    ("<=", Operator::LessEqual),
    (">=", Operator::GreaterEqual),
    ("<", Operator::Less),
    (">", Operator::Greater),
];

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Compatible => "~=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::ArbitraryEqual => "===",
        }
    }

    /// Exact pins: `==` and `===`
    pub fn is_exact(&self) -> bool {
        matches!(self, Operator::Equal | Operator::ArbitraryEqual)
    }

    fn version_regex(&self) -> &'static Regex {
        match self {
            Operator::ArbitraryEqual => &ARBITRARY_VERSION,
            Operator::Equal | Operator::NotEqual => &EQUALITY_VERSION,
            Operator::Compatible => &COMPATIBLE_VERSION,
            _ => &ORDERED_VERSION,
        }
    }
}

/// One `<op><version>` constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    pub operator: Operator,
    pub version: String,
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)
    }
}

/// Unordered set of specifiers, rendered sorted and comma-joined
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn insert(&mut self, specifier: Specifier) {
        if !self.specifiers.contains(&specifier) {
            self.specifiers.push(specifier);
        }
    }

    pub fn len(&self) -> usize {
        self.specifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// The pinned version, only when the set is a single `==`/`===` constraint
    pub fn pinned_version(&self) -> Option<&str> {
        match self.specifiers.as_slice() {
            [only] if only.operator.is_exact() => Some(only.version.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        rendered.sort();
        f.write_str(&rendered.join(","))
    }
}

/// A parsed PEP 508 requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: BTreeSet<String>,
    pub specifier: SpecifierSet,
    pub url: Option<String>,
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// Parse a dependency specifier string
    pub fn parse(text: &str) -> Result<Self, RequirementError> {
        let mut cursor = Cursor::new(text, SyntaxKind::Requirement);

        cursor.eat_ws();
        let name = cursor
            .identifier()
            .ok_or_else(|| cursor.error("Expected package name at the start of dependency specifier"))?
            .to_string();
        cursor.eat_ws();

        let extras = parse_extras(&mut cursor)?;
        cursor.eat_ws();

        let (url, specifier, marker) = parse_details(&mut cursor)?;

        if !cursor.at_end() {
            return Err(cursor.error("Expected end of dependency specifier"));
        }

        Ok(Self {
            name,
            extras,
            specifier,
            url,
            marker,
        })
    }

    pub fn pinned_version(&self) -> Option<&str> {
        self.specifier.pinned_version()
    }
}

fn parse_extras(cursor: &mut Cursor<'_>) -> Result<BTreeSet<String>, RequirementError> {
    let mut extras = BTreeSet::new();
    if !cursor.eat_char('[') {
        return Ok(extras);
    }
    cursor.eat_ws();

    if let Some(first) = cursor.identifier() {
        extras.insert(first.to_string());
        loop {
            cursor.eat_ws();
            if cursor.check_regex(&IDENTIFIER) {
                return Err(cursor.error("Expected comma between extra names"));
            }
            if !cursor.eat_char(',') {
                break;
            }
            cursor.eat_ws();
            let extra = cursor
                .identifier()
                .ok_or_else(|| cursor.error("Expected extra name after comma"))?;
            extras.insert(extra.to_string());
        }
    }

    cursor.eat_ws();
    if !cursor.eat_char(']') {
        return Err(cursor.error("Expected matching RIGHT_BRACKET for LEFT_BRACKET, after extras"));
    }
    Ok(extras)
}

type Details = (Option<String>, SpecifierSet, Option<MarkerTree>);

fn parse_details(cursor: &mut Cursor<'_>) -> Result<Details, RequirementError> {
    if cursor.eat_char('@') {
        cursor.eat_ws();
        let url = cursor
            .eat_regex(&URL)
            .ok_or_else(|| cursor.error("Expected URL after @"))?
            .to_string();
        if cursor.at_end() {
            return Ok((Some(url), SpecifierSet::default(), None));
        }
        if !cursor.eat_ws() {
            return Err(cursor.error("Expected whitespace after URL"));
        }
        if cursor.at_end() {
            return Ok((Some(url), SpecifierSet::default(), None));
        }
        let marker = parse_requirement_marker(cursor, "URL and whitespace")?;
        return Ok((Some(url), SpecifierSet::default(), Some(marker)));
    }

    let specifier = parse_specifier(cursor)?;
    cursor.eat_ws();
    if cursor.at_end() {
        return Ok((None, specifier, None));
    }

    let after = if specifier.is_empty() {
        "name and no valid version specifier"
    } else {
        "version specifier"
    };
    let marker = parse_requirement_marker(cursor, after)?;
    Ok((None, specifier, Some(marker)))
}

fn parse_requirement_marker(
    cursor: &mut Cursor<'_>,
    after: &str,
) -> Result<MarkerTree, RequirementError> {
    if !cursor.eat_char(';') {
        return Err(cursor.error(format!("Expected end or semicolon (after {after})")));
    }
    let marker = marker::parse_marker(cursor)?;
    cursor.eat_ws();
    Ok(marker)
}

fn parse_specifier(cursor: &mut Cursor<'_>) -> Result<SpecifierSet, RequirementError> {
    let parenthesized = cursor.eat_char('(');
    cursor.eat_ws();

    let mut set = SpecifierSet::default();
    while let Some(specifier) = read_specifier(cursor)? {
        set.insert(specifier);
        cursor.eat_ws();
        if !cursor.eat_char(',') {
            break;
        }
        cursor.eat_ws();
    }

    cursor.eat_ws();
    if parenthesized && !cursor.eat_char(')') {
        return Err(cursor.error(
            "Expected matching RIGHT_PARENTHESIS for LEFT_PARENTHESIS, after version specifier",
        ));
    }
    Ok(set)
}

/// Read one `<op><version>` token, leaving the cursor untouched when the
/// input does not start with a complete specifier.
fn read_specifier(cursor: &mut Cursor<'_>) -> Result<Option<Specifier>, RequirementError> {
    let rest = cursor.rest();
    let Some((symbol, operator)) = OPERATORS.iter().find(|(symbol, _)| rest.starts_with(symbol))
    else {
        return Ok(None);
    };

    let start = cursor.pos;
    cursor.pos += symbol.len();
    let Some(version) = cursor.eat_regex(operator.version_regex()) else {
        cursor.pos = start;
        return Ok(None);
    };
    let version = version.trim().to_string();

    if !matches!(operator, Operator::Equal | Operator::NotEqual) {
        if cursor.check_regex(&PREFIX_TRAIL) {
            return Err(cursor.error("`.*` suffix can only be used with `==` or `!=` operators"));
        }
        if cursor.check_regex(&LOCAL_TRAIL) {
            return Err(cursor.error(
                "Local version label can only be used with `==` or `!=` operators",
            ));
        }
    }

    Ok(Some(Specifier {
        operator: *operator,
        version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_specifier() {
        let req = Requirement::parse("foo[extra2,extra1]>=1.0; python_version>='3.8'").unwrap();
        assert_eq!(req.name, "foo");
        assert_eq!(
            req.extras.iter().collect::<Vec<_>>(),
            vec!["extra1", "extra2"]
        );
        assert_eq!(req.specifier.to_string(), ">=1.0");
        assert_eq!(
            req.marker.as_ref().map(|m| m.to_string()),
            Some("python_version >= \"3.8\"".to_string())
        );
        assert_eq!(req.pinned_version(), None);
    }

    #[test]
    fn test_single_exact_pin_sets_version() {
        let req = Requirement::parse("foo==1.2.3").unwrap();
        assert_eq!(req.pinned_version(), Some("1.2.3"));

        let req = Requirement::parse("foo===1.0-custom").unwrap();
        assert_eq!(req.pinned_version(), Some("1.0-custom"));

        let req = Requirement::parse("foo==1.*").unwrap();
        assert_eq!(req.pinned_version(), Some("1.*"));
    }

    #[test]
    fn test_other_shapes_have_no_version() {
        for text in ["foo", "foo>=1.0", "foo~=1.4", "foo==1.0,!=1.1", "foo>1,<2"] {
            let req = Requirement::parse(text).unwrap();
            assert_eq!(req.pinned_version(), None, "{text}");
        }
    }

    #[test]
    fn test_specifier_set_sorted_and_deduplicated() {
        let req = Requirement::parse("foo >= 1.0, < 2, >=1.0").unwrap();
        assert_eq!(req.specifier.len(), 2);
        assert_eq!(req.specifier.to_string(), "<2,>=1.0");

        let req = Requirement::parse("foo==1.0,==1.0").unwrap();
        assert_eq!(req.pinned_version(), Some("1.0"));
    }

    #[test]
    fn test_parenthesized_specifier() {
        let req = Requirement::parse("foo (>=1.0,<2.0)").unwrap();
        assert_eq!(req.specifier.to_string(), "<2.0,>=1.0");
    }

    #[test]
    fn test_trailing_comma_is_accepted() {
        let req = Requirement::parse("foo>=1,").unwrap();
        assert_eq!(req.specifier.to_string(), ">=1");
    }

    #[test]
    fn test_extras_deduplicated_and_sorted() {
        let req = Requirement::parse("pkg[b, a, b ,c]").unwrap();
        assert_eq!(req.extras.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        let req = Requirement::parse("pkg[]").unwrap();
        assert!(req.extras.is_empty());
    }

    #[test]
    fn test_url_requirement() {
        let req = Requirement::parse("pkg @ https://example.com/pkg.zip ; os_name == 'nt'").unwrap();
        assert_eq!(req.url.as_deref(), Some("https://example.com/pkg.zip"));
        assert!(req.specifier.is_empty());
        assert_eq!(req.marker.unwrap().to_string(), "os_name == \"nt\"");
    }

    #[test]
    fn test_name_only_with_marker() {
        let req = Requirement::parse("pywin32 ; sys_platform == 'win32'").unwrap();
        assert_eq!(req.name, "pywin32");
        assert!(req.specifier.is_empty());
        assert!(req.marker.is_some());
    }

    #[test]
    fn test_compatible_release_needs_two_components() {
        assert!(Requirement::parse("foo~=1.0").is_ok());
        assert!(Requirement::parse("foo~=1").is_err());
    }

    #[test]
    fn test_wildcard_and_local_only_for_equality() {
        assert!(Requirement::parse("foo!=1.*").is_ok());
        assert!(Requirement::parse("foo==1.0+local.7").is_ok());

        let err = Requirement::parse("foo>=1.*").unwrap_err();
        assert!(err.message.contains("`.*` suffix"));

        let err = Requirement::parse("foo<=1.0+local").unwrap_err();
        assert!(err.message.contains("Local version label"));
    }

    #[test]
    fn test_malformed_specifiers_are_classified() {
        let err = Requirement::parse("foo>=1.0 bar").unwrap_err();
        assert_eq!(err.kind, SyntaxKind::Requirement);
        assert_eq!(err.message, "Expected end or semicolon (after version specifier)");
        assert_eq!(err.position, 9);

        let err = Requirement::parse("").unwrap_err();
        assert_eq!(
            err.message,
            "Expected package name at the start of dependency specifier"
        );

        let err = Requirement::parse("foo=1").unwrap_err();
        assert_eq!(
            err.message,
            "Expected end or semicolon (after name and no valid version specifier)"
        );

        let err = Requirement::parse("foo[bar").unwrap_err();
        assert!(err.message.contains("RIGHT_BRACKET"));

        assert!(Requirement::parse("foo[a b]").is_err());
        assert!(Requirement::parse("foo>=").is_err());
    }

    #[test]
    fn test_error_display_points_at_position() {
        let err = Requirement::parse("foo>=1.0 bar").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.starts_with("Expected end or semicolon"));
        assert!(rendered.ends_with("    foo>=1.0 bar\n             ^"));
        assert_eq!(err.class_name(), "InvalidRequirement");
    }

    #[test]
    fn test_name_keeps_declared_spelling() {
        let req = Requirement::parse("Django_Rest.Framework>=3").unwrap();
        assert_eq!(req.name, "Django_Rest.Framework");
    }

    #[test]
    fn test_pre_post_dev_versions() {
        for text in [
            "foo>=1.0a1",
            "foo>=1.0.post2",
            "foo<2.0.dev3",
            "foo==1.0rc1",
            "foo>=v1.0",
            "foo>=1!2.0",
        ] {
            assert!(Requirement::parse(text).is_ok(), "{text}");
        }
    }
}
