//! Configuration management for dependi-python

use serde::Deserialize;

/// Environment variable holding JSON configuration overrides
pub const OPTIONS_ENV: &str = "DEPENDI_PYTHON_OPTIONS";

/// Default evaluation step budget for setup.py
const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Default call-depth limit for setup.py
const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Extraction configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Requirement list discovery
    pub requirements: RequirementsConfig,
    /// Legacy setup.py / setup.cfg extraction
    pub setup: SetupConfig,
}

/// Requirement list discovery configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequirementsConfig {
    /// Extensions of plain requirement lists, scanned first
    pub list_suffixes: Vec<String>,
    /// Extensions of pip-compile inputs, scanned after the plain lists
    pub compile_suffixes: Vec<String>,
}

impl Default for RequirementsConfig {
    fn default() -> Self {
        Self {
            list_suffixes: vec!["txt".to_string()],
            compile_suffixes: vec!["in".to_string()],
        }
    }
}

/// Legacy packaging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Name of the setup script inside the scanned directory
    pub script_name: String,
    /// Name of the declarative config inside the scanned directory
    pub config_name: String,
    /// Evaluation limits and placeholders for the setup script
    pub sandbox: SandboxConfig,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            script_name: "setup.py".to_string(),
            config_name: "setup.cfg".to_string(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// setup.py evaluation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Statements, loop iterations and calls allowed per evaluation
    pub step_limit: u64,
    /// Maximum nesting of user function calls
    pub max_call_depth: usize,
    /// Metadata bound before the script runs
    pub placeholders: PlaceholderMetadata,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            placeholders: PlaceholderMetadata::default(),
        }
    }
}

/// Package metadata a setup script commonly reads from its own package
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaceholderMetadata {
    pub version: String,
    pub author: String,
    /// Used for title, description, author email, license and url
    pub filler: String,
}

impl Default for PlaceholderMetadata {
    fn default() -> Self {
        Self {
            version: "0.0.1+placeholder".to_string(),
            author: "someone".to_string(),
            filler: "something".to_string(),
        }
    }
}

impl PlaceholderMetadata {
    /// Dunder globals seeded into the script namespace
    pub fn globals(&self) -> impl Iterator<Item = (String, String)> + '_ {
        [
            ("__version__", &self.version),
            ("__author__", &self.author),
            ("__title__", &self.filler),
            ("__description__", &self.filler),
            ("__author_email__", &self.filler),
            ("__license__", &self.filler),
            ("__url__", &self.filler),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
    }

    /// Content served by the fake `open()`: the same metadata as Python
    /// assignments, preceded by a `VERSION` tuple.
    pub fn file_content(&self) -> String {
        let parts: Vec<String> = self
            .version
            .splitn(3, '.')
            .map(|part| format!("'{part}'"))
            .collect();
        let mut content = format!("VERSION = ({})\n", parts.join(", "));
        for (name, value) in self.globals() {
            content.push_str(&format!("{name} = '{value}'\n"));
        }
        content
    }
}

impl Config {
    /// Parse configuration from JSON options, falling back to defaults
    pub fn from_options(options: Option<serde_json::Value>) -> Self {
        match options {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                tracing::warn!("Ignoring invalid configuration: {}", err);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Configuration from the `DEPENDI_PYTHON_OPTIONS` environment variable
    pub fn from_env() -> Self {
        let options = std::env::var(OPTIONS_ENV).ok().and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|err| tracing::warn!("{} is not valid JSON: {}", OPTIONS_ENV, err))
                .ok()
        });
        Self::from_options(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.requirements.list_suffixes, vec!["txt"]);
        assert_eq!(config.requirements.compile_suffixes, vec!["in"]);
        assert_eq!(config.setup.script_name, "setup.py");
        assert_eq!(config.setup.config_name, "setup.cfg");
        assert_eq!(config.setup.sandbox.step_limit, DEFAULT_STEP_LIMIT);
        assert_eq!(config.setup.sandbox.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn test_partial_config() {
        let json = json!({
            "setup": {
                "sandbox": { "step_limit": 500 }
            }
        });

        let config = Config::from_options(Some(json));
        assert_eq!(config.setup.sandbox.step_limit, 500);
        // Other fields should use defaults
        assert_eq!(config.setup.sandbox.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.setup.script_name, "setup.py");
        assert_eq!(config.requirements.list_suffixes, vec!["txt"]);
    }

    #[test]
    fn test_from_options_invalid_json() {
        let config = Config::from_options(Some(json!("invalid")));
        assert_eq!(config.setup.sandbox.step_limit, DEFAULT_STEP_LIMIT);

        let config = Config::from_options(None);
        assert_eq!(config.requirements.compile_suffixes, vec!["in"]);
    }

    #[test]
    fn test_placeholder_file_content() {
        let content = PlaceholderMetadata::default().file_content();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "VERSION = ('0', '0', '1+placeholder')");
        assert_eq!(lines[1], "__version__ = '0.0.1+placeholder'");
        assert_eq!(lines[2], "__author__ = 'someone'");
        assert_eq!(lines[7], "__url__ = 'something'");
    }

    #[test]
    fn test_placeholder_globals() {
        let globals: Vec<(String, String)> = PlaceholderMetadata::default().globals().collect();
        assert_eq!(globals.len(), 7);
        assert!(globals.contains(&("__license__".to_string(), "something".to_string())));
    }
}
