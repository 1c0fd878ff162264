//! setup.cfg reading with Python `configparser` semantics
//!
//! Only the default `ConfigParser` behavior is implemented: `=`/`:`
//! delimiters, `#`/`;` full-line comments, indented continuation lines,
//! lower-cased option names, a `[DEFAULT]` section, strict duplicate
//! detection and `%(name)s` interpolation on reads.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::setup::DeclarationKind;
use crate::utils::python_str_repr;

const DEFAULT_SECTION: &str = "DEFAULT";
const COMMENT_PREFIXES: [&str; 2] = ["#", ";"];
const MAX_INTERPOLATION_DEPTH: usize = 10;

static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.+)\]").expect("section header regex"));

static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*([=:])\s*(.*)$").expect("option line regex"));

static INTERPOLATION_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%\(([^)]+)\)s").expect("interpolation key regex"));

/// configparser failures, displayed with the messages Python produces
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IniError {
    #[error(
        "File contains no section headers.\nfile: {}, line: {line}\n{}",
        python_str_repr(.file),
        python_str_repr(.text)
    )]
    MissingSectionHeader {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{}", parsing_message(.file, .lines))]
    Parsing {
        file: String,
        lines: Vec<(usize, String)>,
    },

    #[error(
        "While reading from {} [line {line:2}]: section {} already exists",
        python_str_repr(.file),
        python_str_repr(.section)
    )]
    DuplicateSection {
        file: String,
        line: usize,
        section: String,
    },

    #[error(
        "While reading from {} [line {line:2}]: option {} in section {} already exists",
        python_str_repr(.file),
        python_str_repr(.option),
        python_str_repr(.section)
    )]
    DuplicateOption {
        file: String,
        line: usize,
        section: String,
        option: String,
    },

    #[error("{message}")]
    InterpolationSyntax {
        section: String,
        option: String,
        message: String,
    },

    #[error(
        "Bad value substitution: option {} in section {} contains an interpolation key {} which is not a valid option name. Raw value: {}",
        python_str_repr(.option),
        python_str_repr(.section),
        python_str_repr(.reference),
        python_str_repr(.raw)
    )]
    InterpolationMissingOption {
        section: String,
        option: String,
        reference: String,
        raw: String,
    },

    #[error(
        "Recursion limit exceeded in value substitution: option {} in section {} contains an interpolation key which cannot be substituted in {} steps. Raw value: {}",
        python_str_repr(.option),
        python_str_repr(.section),
        MAX_INTERPOLATION_DEPTH,
        python_str_repr(.raw)
    )]
    InterpolationDepth {
        section: String,
        option: String,
        raw: String,
    },
}

impl IniError {
    pub fn class_name(&self) -> &'static str {
        match self {
            IniError::MissingSectionHeader { .. } => "MissingSectionHeaderError",
            IniError::Parsing { .. } => "ParsingError",
            IniError::DuplicateSection { .. } => "DuplicateSectionError",
            IniError::DuplicateOption { .. } => "DuplicateOptionError",
            IniError::InterpolationSyntax { .. } => "InterpolationSyntaxError",
            IniError::InterpolationMissingOption { .. } => "InterpolationMissingOptionError",
            IniError::InterpolationDepth { .. } => "InterpolationDepthError",
        }
    }
}

fn parsing_message(file: &str, lines: &[(usize, String)]) -> String {
    let mut message = format!("Source contains parsing errors: {}", python_str_repr(file));
    for (line, text) in lines {
        message.push_str(&format!("\n\t[line {line:2}]: {}", python_str_repr(text)));
    }
    message
}

type Options = Vec<(String, String)>;

/// A parsed INI document; sections and options keep file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    defaults: Options,
    sections: Vec<(String, Options)>,
}

/// Where option lines currently land while reading
#[derive(Debug, Clone, Copy)]
enum Target {
    Defaults,
    Section(usize),
}

impl IniDocument {
    /// Parse INI text; `file` is only used in error messages.
    pub fn parse(content: &str, file: &str) -> Result<Self, IniError> {
        let mut defaults: Vec<(String, Vec<String>)> = Vec::new();
        let mut sections: Vec<(String, Vec<(String, Vec<String>)>)> = Vec::new();

        let mut target: Option<Target> = None;
        let mut section_name = String::new();
        let mut option: Option<usize> = None;
        let mut indent_level = 0;
        let mut seen_sections: HashSet<String> = HashSet::new();
        let mut seen_options: HashSet<(String, String)> = HashSet::new();
        let mut bad_lines = Vec::new();

        for (index, raw) in content.split_inclusive('\n').enumerate() {
            let line_number = index + 1;
            let stripped = raw.trim();
            let is_comment = COMMENT_PREFIXES
                .iter()
                .any(|prefix| stripped.starts_with(prefix));
            let value = if is_comment { "" } else { stripped };

            if value.is_empty() {
                if !is_comment
                    && let (Some(target), Some(option)) = (target, option)
                {
                    let options = match target {
                        Target::Defaults => &mut defaults,
                        Target::Section(i) => &mut sections[i].1,
                    };
                    options[option].1.push(String::new());
                }
                continue;
            }

            let indent = raw
                .find(|c: char| !c.is_whitespace())
                .unwrap_or_default();

            if let (Some(target), Some(option)) = (target, option)
                && indent > indent_level
            {
                let options = match target {
                    Target::Defaults => &mut defaults,
                    Target::Section(i) => &mut sections[i].1,
                };
                options[option].1.push(value.to_string());
                continue;
            }
            indent_level = indent;

            if let Some(header) = SECTION_HEADER.captures(value).and_then(|caps| caps.get(1)) {
                let name = header.as_str().to_string();
                if let Some(existing) = sections.iter().position(|(section, _)| *section == name) {
                    if seen_sections.contains(&name) {
                        return Err(IniError::DuplicateSection {
                            file: file.to_string(),
                            line: line_number,
                            section: name,
                        });
                    }
                    target = Some(Target::Section(existing));
                    seen_sections.insert(name.clone());
                } else if name == DEFAULT_SECTION {
                    target = Some(Target::Defaults);
                } else {
                    sections.push((name.clone(), Vec::new()));
                    target = Some(Target::Section(sections.len() - 1));
                    seen_sections.insert(name.clone());
                }
                section_name = name;
                option = None;
                continue;
            }

            let Some(current) = target else {
                return Err(IniError::MissingSectionHeader {
                    file: file.to_string(),
                    line: line_number,
                    text: raw.to_string(),
                });
            };

            let Some(caps) = OPTION_LINE.captures(value) else {
                bad_lines.push((line_number, raw.to_string()));
                continue;
            };
            let name = caps.get(1).map_or("", |m| m.as_str());
            if name.is_empty() {
                bad_lines.push((line_number, raw.to_string()));
            }
            let name = name.trim_end().to_lowercase();
            let option_value = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();

            if !seen_options.insert((section_name.clone(), name.clone())) {
                return Err(IniError::DuplicateOption {
                    file: file.to_string(),
                    line: line_number,
                    section: section_name,
                    option: name,
                });
            }

            let options = match current {
                Target::Defaults => &mut defaults,
                Target::Section(i) => &mut sections[i].1,
            };
            option = Some(match options.iter().position(|(existing, _)| *existing == name) {
                Some(position) => {
                    options[position].1 = vec![option_value];
                    position
                }
                None => {
                    options.push((name, vec![option_value]));
                    options.len() - 1
                }
            });
        }

        if !bad_lines.is_empty() {
            return Err(IniError::Parsing {
                file: file.to_string(),
                lines: bad_lines,
            });
        }

        let join = |options: Vec<(String, Vec<String>)>| -> Options {
            options
                .into_iter()
                .map(|(name, lines)| (name, lines.join("\n").trim_end().to_string()))
                .collect()
        };
        Ok(Self {
            defaults: join(defaults),
            sections: sections
                .into_iter()
                .map(|(name, options)| (name, join(options)))
                .collect(),
        })
    }

    /// Whether a (non-DEFAULT) section exists
    pub fn has_section(&self, section: &str) -> bool {
        self.section(section).is_some()
    }

    fn section(&self, section: &str) -> Option<&Options> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .map(|(_, options)| options)
    }

    /// Section options without `[DEFAULT]` fallbacks or interpolation
    pub fn raw_items(&self, section: &str) -> &[(String, String)] {
        self.section(section).map_or(&[], Vec::as_slice)
    }

    /// Option lookup with `[DEFAULT]` fallback, without interpolation
    fn lookup(&self, section: &str, option: &str) -> Option<&str> {
        let own = self
            .section(section)?
            .iter()
            .find(|(name, _)| name == option);
        own.or_else(|| self.defaults.iter().find(|(name, _)| name == option))
            .map(|(_, value)| value.as_str())
    }

    /// Interpolated option value; `None` when the section or option is absent
    pub fn get(&self, section: &str, option: &str) -> Result<Option<String>, IniError> {
        let option = option.to_lowercase();
        let Some(raw) = self.lookup(section, &option) else {
            return Ok(None);
        };
        let mut value = String::new();
        self.interpolate(section, &option, raw, raw, 1, &mut value)?;
        Ok(Some(value))
    }

    fn interpolate(
        &self,
        section: &str,
        option: &str,
        raw: &str,
        mut rest: &str,
        depth: usize,
        out: &mut String,
    ) -> Result<(), IniError> {
        if depth > MAX_INTERPOLATION_DEPTH {
            return Err(IniError::InterpolationDepth {
                section: section.to_string(),
                option: option.to_string(),
                raw: raw.to_string(),
            });
        }

        while !rest.is_empty() {
            let Some(percent) = rest.find('%') else {
                out.push_str(rest);
                return Ok(());
            };
            out.push_str(&rest[..percent]);
            rest = &rest[percent..];

            match rest[1..].chars().next() {
                Some('%') => {
                    out.push('%');
                    rest = &rest[2..];
                }
                Some('(') => {
                    let caps = INTERPOLATION_KEY.captures(rest).ok_or_else(|| {
                        IniError::InterpolationSyntax {
                            section: section.to_string(),
                            option: option.to_string(),
                            message: format!(
                                "bad interpolation variable reference {}",
                                python_str_repr(rest)
                            ),
                        }
                    })?;
                    let reference = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
                    let end = caps.get(0).map_or(rest.len(), |m| m.end());
                    rest = &rest[end..];

                    let value = self.lookup(section, &reference).ok_or_else(|| {
                        IniError::InterpolationMissingOption {
                            section: section.to_string(),
                            option: option.to_string(),
                            reference: reference.clone(),
                            raw: raw.to_string(),
                        }
                    })?;
                    if value.contains('%') {
                        self.interpolate(section, option, raw, value, depth + 1, out)?;
                    } else {
                        out.push_str(value);
                    }
                }
                _ => {
                    return Err(IniError::InterpolationSyntax {
                        section: section.to_string(),
                        option: option.to_string(),
                        message: format!(
                            "'%' must be followed by '%' or '(', found: {}",
                            python_str_repr(rest)
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

fn non_blank_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Requirement declarations of a setup.cfg, in declaration order:
/// `[options]` buckets first, then every `[options.extras_require]` key.
pub fn declarations(document: &IniDocument) -> Result<Vec<(DeclarationKind, Vec<String>)>, IniError> {
    let mut declared = Vec::new();

    for kind in [
        DeclarationKind::SetupRequires,
        DeclarationKind::InstallRequires,
        DeclarationKind::TestsRequire,
    ] {
        let value = document.get("options", kind.key())?.unwrap_or_default();
        declared.push((kind, non_blank_lines(&value)));
    }

    for (group, value) in document.raw_items("options.extras_require") {
        declared.push((
            DeclarationKind::ExtrasRequire(group.clone()),
            non_blank_lines(value),
        ));
    }

    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> IniDocument {
        IniDocument::parse(content, "setup.cfg").unwrap()
    }

    #[test]
    fn test_multiline_values_and_comments() {
        let doc = parse(
            "[metadata]\nname = demo\n\n[options]\ninstall_requires =\n    requests>=2\n    # a comment\n\n    click\n",
        );
        assert_eq!(
            doc.get("options", "install_requires").unwrap().as_deref(),
            Some("\nrequests>=2\n\nclick")
        );
        assert_eq!(doc.get("metadata", "NAME").unwrap().as_deref(), Some("demo"));
    }

    #[test]
    fn test_colon_delimiter_and_lowercase_keys() {
        let doc = parse("[options]\nInstall_Requires: six\n");
        assert_eq!(
            doc.get("options", "install_requires").unwrap().as_deref(),
            Some("six")
        );
    }

    #[test]
    fn test_default_section_fallback() {
        let doc = parse("[DEFAULT]\nbase = attrs\n[options]\ntests_require = %(base)s\n");
        assert_eq!(
            doc.get("options", "tests_require").unwrap().as_deref(),
            Some("attrs")
        );
        assert_eq!(doc.get("options", "base").unwrap().as_deref(), Some("attrs"));
        assert!(!doc.has_section("DEFAULT"));
    }

    #[test]
    fn test_missing_section_or_option() {
        let doc = parse("[metadata]\nname = x\n");
        assert_eq!(doc.get("options", "install_requires").unwrap(), None);
        assert_eq!(doc.get("metadata", "version").unwrap(), None);
    }

    #[test]
    fn test_interpolation_escapes_and_errors() {
        let doc = parse(
            "[options]\na = 100%%\nb = %(missing)s\nc = 50%\nd = %(d)s\ne = %(bad\n",
        );
        assert_eq!(doc.get("options", "a").unwrap().as_deref(), Some("100%"));

        let err = doc.get("options", "b").unwrap_err();
        assert_eq!(err.class_name(), "InterpolationMissingOptionError");

        let err = doc.get("options", "c").unwrap_err();
        assert_eq!(err.class_name(), "InterpolationSyntaxError");
        assert_eq!(
            err.to_string(),
            "'%' must be followed by '%' or '(', found: '%'"
        );

        let err = doc.get("options", "d").unwrap_err();
        assert_eq!(err.class_name(), "InterpolationDepthError");

        let err = doc.get("options", "e").unwrap_err();
        assert!(err.to_string().starts_with("bad interpolation variable reference"));
    }

    #[test]
    fn test_missing_section_header() {
        let err = IniDocument::parse("install_requires = x\n", "setup.cfg").unwrap_err();
        assert_eq!(
            err.to_string(),
            "File contains no section headers.\nfile: 'setup.cfg', line: 1\n'install_requires = x\\n'"
        );
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let err = IniDocument::parse("[a]\nx = 1\n[a]\n", "setup.cfg").unwrap_err();
        assert_eq!(
            err.to_string(),
            "While reading from 'setup.cfg' [line  3]: section 'a' already exists"
        );

        let err = IniDocument::parse("[a]\nx = 1\nX = 2\n", "setup.cfg").unwrap_err();
        assert_eq!(err.class_name(), "DuplicateOptionError");
    }

    #[test]
    fn test_parsing_error_lists_bad_lines() {
        let err = IniDocument::parse("[a]\nx = 1\nnot an option\n", "setup.cfg").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Source contains parsing errors: 'setup.cfg'\n\t[line  3]: 'not an option\\n'"
        );
    }

    #[test]
    fn test_declarations() {
        let doc = parse(
            "[options]\nsetup_requires = wheel\ninstall_requires =\n    requests\n    click>=7\n\n[options.extras_require]\nDocs = sphinx\ntest =\n    pytest\n    %(not_interpolated)s\n",
        );
        let declared = declarations(&doc).unwrap();
        let tags: Vec<String> = declared.iter().map(|(kind, _)| kind.tag()).collect();
        assert_eq!(
            tags,
            vec![
                "setup_requires",
                "install_requires",
                "tests_require",
                "extras_require:docs",
                "extras_require:test"
            ]
        );
        assert_eq!(declared[1].1, vec!["requests", "click>=7"]);
        assert!(declared[2].1.is_empty());
        assert_eq!(declared[4].1, vec!["pytest", "%(not_interpolated)s"]);
    }
}
