//! The single-line JSON result envelope written by the CLI

use std::process::ExitCode;

use serde::Serialize;

use crate::error::ExtractError;
use crate::parsers::DependencyRecord;

/// `{"result": [...]}` on success, `{"error": "Class('message')"}` on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    Result(Vec<DependencyRecord>),
    Error(String),
}

impl Envelope {
    pub fn from_result(result: Result<Vec<DependencyRecord>, ExtractError>) -> Self {
        match result {
            Ok(records) => Envelope::Result(records),
            Err(err) => {
                tracing::debug!("Extraction failed: {:?}", err);
                Envelope::Error(err.repr())
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error(_))
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_error() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }

    /// Compact JSON, no trailing newline
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
