//! Error types for record mapping, filtering and processing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the mapper registry.
///
/// All of these are fatal and surface before any pipeline stage starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A pattern failed to compile.
    #[error("invalid {kind} pattern for mapper '{id}': {source}")]
    InvalidRegex {
        id: String,
        kind: &'static str,
        #[source]
        source: regex::Error,
    },

    /// No entry pattern was left after inheritance.
    #[error("no entry pattern mapped for '{0}'")]
    MissingEntry(String),

    /// `from` names a mapper that does not exist.
    #[error("mapper '{id}' inherits from unknown mapper '{base}'")]
    UnknownBase { id: String, base: String },

    /// Mappers inherit from each other in a loop.
    #[error("inheritance cycle through mapper '{0}'")]
    InheritanceCycle(String),

    /// A layout id was requested that is not registered.
    #[error("unknown layout '{0}'")]
    UnknownLayout(String),

    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML for the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised while building a predicate.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A `matches` literal is not a valid regular expression.
    #[error("invalid filter expression: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Errors raised by a sink.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Writing output failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A count group has no extractor.
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// An output format name is not known.
    #[error("unknown output format '{0}'")]
    UnknownFormat(String),
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A line source could not be opened or read.
    #[error("failed to read {source_id}: {source}")]
    Io {
        source_id: String,
        #[source]
        source: io::Error,
    },

    /// The sink failed.
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// A stage task panicked or was aborted by the runtime.
    #[error("pipeline stage '{stage}' did not complete: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    /// The sink was cancelled before it could finish.
    #[error("pipeline aborted before the sink finished")]
    Aborted,
}
