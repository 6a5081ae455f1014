//! Shared types for sherlog
//!
//! This crate contains the raw line and record types passed between the
//! pipeline stages.

use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Input Types
// ============================================================================

/// A single line read from a log source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// Line text without its terminator
    pub content: String,

    /// Identifier of the originating file or stream
    pub source: Arc<str>,

    /// 1-based position within the source
    pub index: u64,
}

impl Line {
    pub fn new(source: impl Into<Arc<str>>, index: u64, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            index,
        }
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// A closed log record
///
/// Built by an [`OpenEntry`] and read-only afterwards. Every structured field
/// defaults to the empty string when the layout did not capture it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Entry {
    source: Arc<str>,
    line: u64,
    time: String,
    level: String,
    category: String,
    origin: String,
    message: String,
    stacktrace: String,
    raw: String,
    exceptions: Vec<String>,
}

impl Entry {
    /// Source the record's first line came from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Line number of the record's first line
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Continuation lines recognized as stacktrace, newline-joined
    pub fn stacktrace(&self) -> &str {
        &self.stacktrace
    }

    /// Every line of the record, newline-joined, in arrival order
    pub fn raw_content(&self) -> &str {
        &self.raw
    }

    /// Exception names in the order they were found (duplicates kept)
    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }
}

/// A record still accepting continuation lines
///
/// Owned exclusively by the mapper that created it. [`OpenEntry::close`]
/// freezes it into an [`Entry`].
#[derive(Debug)]
pub struct OpenEntry {
    entry: Entry,
}

impl OpenEntry {
    /// Start a record from its first line
    pub fn new(line: &Line) -> Self {
        Self {
            entry: Entry {
                source: Arc::clone(&line.source),
                line: line.index,
                raw: line.content.clone(),
                ..Entry::default()
            },
        }
    }

    pub fn set_time(&mut self, time: &str) {
        self.entry.time = time.to_string();
    }

    pub fn set_level(&mut self, level: &str) {
        self.entry.level = level.to_string();
    }

    pub fn set_category(&mut self, category: &str) {
        self.entry.category = category.to_string();
    }

    pub fn set_origin(&mut self, origin: &str) {
        self.entry.origin = origin.to_string();
    }

    pub fn set_message(&mut self, message: &str) {
        self.entry.message = message.to_string();
    }

    pub fn append_message(&mut self, text: &str) {
        self.entry.message.push_str(text);
    }

    pub fn add_exception(&mut self, exception: impl Into<String>) {
        self.entry.exceptions.push(exception.into());
    }

    /// Append a stacktrace line (also recorded in the raw content)
    pub fn add_stacktrace(&mut self, line: &str) {
        if !self.entry.stacktrace.is_empty() {
            self.entry.stacktrace.push('\n');
        }
        self.entry.stacktrace.push_str(line);
        self.append(line);
    }

    /// Append a continuation line to the raw content
    pub fn append(&mut self, line: &str) {
        self.entry.raw.push('\n');
        self.entry.raw.push_str(line);
    }

    /// Current view of the record being built
    pub fn peek(&self) -> &Entry {
        &self.entry
    }

    pub fn close(self) -> Entry {
        self.entry
    }
}
