//! Side-effect-free partial evaluation of setup.py scripts
//!
//! A setup script is code, not data, so its dependency declarations are
//! only observable by running it. The script is first rewritten to call
//! harmless stand-ins instead of `print`, logging and file access, then
//! evaluated by a small interpreter for the Python subset such scripts use.
//! Every evaluation builds its own namespace and [`SetupRecorder`]; nothing
//! from the host (environment, filesystem, real modules) is reachable.

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod recorder;
mod sanitize;
mod value;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config::SandboxConfig;

pub use interp::Interpreter;
pub use recorder::{RecordedRequirement, SetupRecorder};
pub use sanitize::sanitize;

/// File name reported in syntax errors and bound to `__file__`
pub const SCRIPT_NAME: &str = "setup.py";

/// An evaluation failure, named after the Python exception it stands for
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SandboxError {
    pub class: String,
    pub message: String,
    pub line: Option<usize>,
}

impl SandboxError {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            line: None,
        }
    }

    pub(crate) fn syntax(message: &str, line: usize) -> Self {
        Self {
            class: "SyntaxError".to_string(),
            message: format!("{message} ({SCRIPT_NAME}, line {line})"),
            line: Some(line),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

/// Sanitize and evaluate a setup script, returning every requirement
/// declaration passed to `setup()`, in call order.
pub fn evaluate_setup_script(
    source: &str,
    config: &SandboxConfig,
) -> Result<Vec<RecordedRequirement>, SandboxError> {
    let sanitized = sanitize(source);
    let program = parser::parse_program(&sanitized)?;

    let recorder = Rc::new(RefCell::new(SetupRecorder::default()));
    let mut interpreter = Interpreter::new(config, Rc::clone(&recorder));
    interpreter.run(&program)?;
    drop(interpreter);

    let recorder = recorder.take();
    let calls = recorder.calls();
    let recorded = recorder.into_entries();
    tracing::debug!(
        "setup() called {} times, declaring {} requirement entries",
        calls,
        recorded.len()
    );
    Ok(recorded)
}
