//! FILENAME: core/engine/src/error.rs
//! PURPOSE: Error taxonomy shared by every engine component.
//! CONTEXT: Configuration and schema errors are authoring mistakes and are
//! returned immediately. Navigation and missing-value conditions are not
//! errors at all (they log a warning and fall back). Compute function
//! failures are wrapped with the function name and keep the original error
//! as their source.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mapping conflict for '{name}' <-> '{column}': {reason}")]
    MappingConflict {
        name: String,
        column: String,
        reason: String,
    },

    #[error("Strict columns in group '{group}': {message}")]
    StrictColumn { group: String, message: String },

    #[error("Index '{0}' is not present")]
    InvalidIndex(String),

    #[error("Subindex '{subindex}' is not a sub-row of index '{index}'")]
    InvalidSubindex { index: String, subindex: String },

    #[error("Column '{column}' lives in read-only group '{group}'")]
    ReadOnly { group: String, column: String },

    #[error("Unknown compute function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' returned {actual} value(s) for {expected} target field(s)")]
    ComputeArity {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Template key '{key}' is not defined; add a mapping entry for it in the configuration")]
    TemplateKey { key: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Function '{function}' failed: {source}")]
    Function {
        function: String,
        #[source]
        source: BoxError,
    },

    #[error("Source error for group '{group}': {source}")]
    Source {
        group: String,
        #[source]
        source: BoxError,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }
}

impl From<template::ParseError> for EngineError {
    fn from(err: template::ParseError) -> Self {
        EngineError::Template(err.message)
    }
}

impl From<template::RenderError> for EngineError {
    fn from(err: template::RenderError) -> Self {
        match err {
            template::RenderError::MissingKey(key) => EngineError::TemplateKey { key },
            other => EngineError::Template(other.to_string()),
        }
    }
}
