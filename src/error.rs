use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Schema structure error: {0}")]
    SchemaStructure(String),
    #[error("Invalid tag <{tag}> found under <{parent}> where one of {expected:?} was expected")]
    InvalidTag { tag: String, parent: String, expected: Vec<String> },
    #[error("Invalid attribute \"{attribute}\" found in <{tag}> where one of {expected:?} was expected")]
    InvalidAttribute { attribute: String, tag: String, expected: Vec<String> },
    #[error("Missing attribute \"{attribute}\" in <{tag}>")]
    MissingAttribute { attribute: String, tag: String },
    #[error("Duplicate {kind}: \"{name}\" in domain \"{domain}\"")]
    DuplicateName { kind: &'static str, name: String, domain: String },
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("Tree inconsistency: \"{name}\" found under \"{found_under}\", cannot place it under \"{target}\"")]
    TreeInconsistency { name: String, found_under: String, target: String },
    #[error("Cannot import {}: {reason}", path.display())]
    ImportResolution { path: PathBuf, reason: String },
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

// Helper conversions
impl From<config::ConfigError> for SchemaError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

impl From<pest::error::Error<crate::markup::Rule>> for SchemaError {
    fn from(e: pest::error::Error<crate::markup::Rule>) -> Self {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        Self::Parse { message: e.variant.message().into_owned(), line: Some(line), col: Some(col) }
    }
}
