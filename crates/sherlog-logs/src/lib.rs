//! Log processing for sherlog
//!
//! This crate turns raw lines into multi-line records, filters them and feeds
//! them to a processor, with each step running as its own task.

mod config;
mod error;
mod filter;
mod mapper;
mod pipeline;
mod processor;
mod reader;

pub use config::{
    ConfigFile, Defaults, JAVA_ENTRY, JAVA_EXCEPTION, JAVA_STACKTRACE, MapperConfig,
    MapperRegistry, WILDFLY_ENTRY,
};
pub use error::{ConfigError, FilterError, PipelineError, ProcessorError};
pub use filter::{Condition, Extractor, FilterBuilder, FilterToken, Operation, Predicate};
pub use mapper::{MapperState, RegexMapper};
pub use pipeline::Pipeline;
pub use processor::{
    CollectProcessor, CountFormat, CountProcessor, CountTemplate, GroupCount, PrintFormat,
    PrintProcessor, Processor, Template,
};
pub use reader::{FileSource, LineSource, STDIN_PATH, TextSource};

// Re-export types used in our public API
pub use sherlog_types::{Entry, Line, OpenEntry};
