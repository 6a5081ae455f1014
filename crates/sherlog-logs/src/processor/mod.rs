//! Terminal consumers of the filtered record stream

mod count;
mod print;
mod template;

pub use count::{CountFormat, CountProcessor, CountTemplate, GroupCount};
pub use print::{PrintFormat, PrintProcessor, Template};

use sherlog_types::Entry;

use crate::error::ProcessorError;

/// A sink driven by the pipeline
///
/// `before` runs once before the first record, `execute` once per accepted
/// record in arrival order, and `after` once the stream is drained. Final
/// output (totals, trailing flushes) belongs in `after`.
pub trait Processor: Send {
    fn before(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn execute(&mut self, entry: &Entry) -> Result<(), ProcessorError>;

    fn after(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    fn before(&mut self) -> Result<(), ProcessorError> {
        (**self).before()
    }

    fn execute(&mut self, entry: &Entry) -> Result<(), ProcessorError> {
        (**self).execute(entry)
    }

    fn after(&mut self) -> Result<(), ProcessorError> {
        (**self).after()
    }
}

/// Keeps every record it receives
#[derive(Debug, Default)]
pub struct CollectProcessor {
    entries: Vec<Entry>,
    finished: bool,
}

impl CollectProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Whether `after` has run
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Processor for CollectProcessor {
    fn execute(&mut self, entry: &Entry) -> Result<(), ProcessorError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn after(&mut self) -> Result<(), ProcessorError> {
        self.finished = true;
        Ok(())
    }
}
