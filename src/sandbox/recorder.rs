//! The `setup()` hook: collects requirement declarations per call

use crate::parsers::setup::DeclarationKind;

use super::value::{Dict, Exec, Value, type_error};

/// One raw requirement string as passed to `setup()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequirement {
    pub kind: DeclarationKind,
    pub raw: String,
}

#[derive(Debug, Default)]
pub struct SetupRecorder {
    entries: Vec<RecordedRequirement>,
    calls: usize,
}

impl SetupRecorder {
    /// Record the declaration keywords of one `setup(**kwargs)` call
    pub fn record_call(&mut self, kwargs: &Dict) -> Exec<()> {
        self.calls += 1;

        for kind in [
            DeclarationKind::SetupRequires,
            DeclarationKind::InstallRequires,
            DeclarationKind::TestsRequire,
        ] {
            if let Some(value) = kwargs.get(&Value::string(kind.key())) {
                self.record_value(&kind, &value)?;
            }
        }

        match kwargs.get(&Value::string("extras_require")) {
            None | Some(Value::None | Value::Opaque) => {}
            Some(Value::Dict(extras)) => {
                let groups = extras.borrow().items().to_vec();
                for (key, value) in groups {
                    let kind = DeclarationKind::ExtrasRequire(key.to_str());
                    self.record_value(&kind, &value)?;
                }
            }
            Some(other) => {
                return Err(type_error(format!(
                    "'{}' object has no attribute 'items'",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    fn record_value(&mut self, kind: &DeclarationKind, value: &Value) -> Exec<()> {
        let items = match value {
            Value::None | Value::Opaque => return Ok(()),
            Value::Str(text) => {
                for line in text.lines().filter(|line| !line.trim().is_empty()) {
                    self.push(kind, line);
                }
                return Ok(());
            }
            Value::List(items) | Value::Set(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Iterator(items) => items.borrow_mut().drain(..).collect(),
            Value::Dict(dict) => dict.borrow().keys(),
            other => {
                return Err(type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        };

        for item in items {
            match item {
                Value::Str(text) => self.push(kind, &text),
                Value::Opaque => {}
                other => {
                    return Err(type_error(format!(
                        "expected string or bytes-like object, got '{}'",
                        other.type_name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, kind: &DeclarationKind, raw: &str) {
        self.entries.push(RecordedRequirement {
            kind: kind.clone(),
            raw: raw.to_string(),
        });
    }

    /// Number of `setup()` calls seen
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn into_entries(self) -> Vec<RecordedRequirement> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::string(*s)).collect())
    }

    #[test]
    fn test_records_in_declaration_order() {
        let mut extras = Dict::default();
        extras.insert(Value::string("socks"), strings(&["PySocks>=1.5.6"]));
        let kwargs = Dict::from_entries([
            (Value::string("extras_require"), Value::dict(extras)),
            (Value::string("install_requires"), strings(&["requests==2.31.0"])),
            (Value::string("setup_requires"), Value::string("wheel\n\nsetuptools>=40\n")),
        ]);

        let mut recorder = SetupRecorder::default();
        recorder.record_call(&kwargs).unwrap();
        assert_eq!(recorder.calls(), 1);

        let entries = recorder.into_entries();
        let summary: Vec<(String, &str)> = entries
            .iter()
            .map(|entry| (entry.kind.tag(), entry.raw.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("setup_requires".to_string(), "wheel"),
                ("setup_requires".to_string(), "setuptools>=40"),
                ("install_requires".to_string(), "requests==2.31.0"),
                ("extras_require:socks".to_string(), "PySocks>=1.5.6"),
            ]
        );
    }

    #[test]
    fn test_opaque_values_contribute_nothing() {
        let kwargs = Dict::from_entries([
            (Value::string("install_requires"), Value::Opaque),
            (Value::string("tests_require"), Value::None),
        ]);
        let mut recorder = SetupRecorder::default();
        recorder.record_call(&kwargs).unwrap();
        assert!(recorder.into_entries().is_empty());
    }

    #[test]
    fn test_non_string_entries_are_type_errors() {
        let kwargs = Dict::from_entries([(
            Value::string("install_requires"),
            Value::list(vec![Value::Int(1)]),
        )]);
        let mut recorder = SetupRecorder::default();
        assert!(matches!(
            recorder.record_call(&kwargs),
            Err(super::super::value::Unwind::Raise(_))
        ));
    }
}
