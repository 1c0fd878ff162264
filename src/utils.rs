//! Common helpers shared by the extractors: comment stripping, path
//! relativization and Python-style string reprs for error envelopes.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use path_clean::clean;
use regex::Regex;

/// A comment starts at `#` when it opens the line or follows whitespace.
/// `pkg#egg` style tokens are not comments.
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s+)#.*$").expect("comment regex is valid"));

static LEADING_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#").expect("leading comment regex is valid"));

/// Remove a trailing comment from a single line.
pub fn strip_comment(line: &str) -> String {
    COMMENT_RE.replace_all(line, "").into_owned()
}

/// Whether the whole line is a comment (possibly indented).
pub fn is_comment_line(line: &str) -> bool {
    LEADING_COMMENT_RE.is_match(line)
}

/// Make a path absolute against the working directory and lexically
/// normalize it (`.` and `..` are folded without touching symlinks).
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    clean(&joined)
}

/// Express `path` relative to `base`, climbing with `..` when `path` lives
/// outside of `base`.
///
/// Both inputs are absolutized first, so relative and absolute spellings of
/// the same location compare equal. Returns `"."` when they are identical.
pub fn relative_path(path: &Path, base: &Path) -> String {
    let path = absolutize(path);
    let base = absolutize(base);

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.to_string_lossy().into_owned()
    }
}

/// Render a string the way Python's `repr()` does for `str` objects.
///
/// Single quotes are preferred; double quotes are used when the text
/// contains a single quote but no double quote.
pub fn python_str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `Class('message')`, the shape of `repr()` for a Python exception with a
/// single string argument.
pub fn python_exception_repr(class: &str, message: &str) -> String {
    format!("{}({})", class, python_str_repr(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("foo==1.2.3  # pinned"), "foo==1.2.3");
        assert_eq!(strip_comment("# whole line"), "");
        assert_eq!(strip_comment("pkg#egg=foo"), "pkg#egg=foo");
        assert_eq!(strip_comment("requests"), "requests");
    }

    #[test]
    fn test_is_comment_line() {
        assert!(is_comment_line("# comment"));
        assert!(is_comment_line("    # indented"));
        assert!(!is_comment_line("foo # trailing"));
    }

    #[test]
    fn test_relative_path_inside_base() {
        let base = Path::new("/project");
        assert_eq!(
            relative_path(Path::new("/project/requirements/dev.txt"), base),
            "requirements/dev.txt"
        );
        assert_eq!(
            relative_path(Path::new("/project/sub/../base.txt"), base),
            "base.txt"
        );
    }

    #[test]
    fn test_relative_path_outside_base() {
        assert_eq!(
            relative_path(Path::new("/shared/constraints.txt"), Path::new("/project")),
            "../shared/constraints.txt"
        );
        assert_eq!(relative_path(Path::new("/project"), Path::new("/project")), ".");
    }

    #[test]
    fn test_python_str_repr_quoting() {
        assert_eq!(python_str_repr("abc"), "'abc'");
        assert_eq!(python_str_repr("it's"), "\"it's\"");
        assert_eq!(python_str_repr("both ' and \""), "'both \\' and \"'");
        assert_eq!(python_str_repr("line\nbreak"), "'line\\nbreak'");
    }

    #[test]
    fn test_python_exception_repr() {
        assert_eq!(
            python_exception_repr("InvalidRequirement", "Expected end"),
            "InvalidRequirement('Expected end')"
        );
    }
}
