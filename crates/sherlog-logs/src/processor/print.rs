use std::io::Write;

use sherlog_types::Entry;

use super::Processor;
use super::template::{Segment, parse_segments};
use crate::error::ProcessorError;

/// Output format for printed records
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PrintFormat {
    /// The record's raw content, exactly as read
    #[default]
    Raw,
    /// One JSON object per record
    Json,
    /// A line template with `{field}` placeholders
    Template(Template),
}

impl PrintFormat {
    /// Parse a format name; anything other than `raw` or `json` is a template
    pub fn parse(format: &str) -> Self {
        match format {
            "" | "raw" | "{raw}" => Self::Raw,
            "json" => Self::Json,
            template => Self::Template(Template::parse(template)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placeholder {
    Time,
    Level,
    Category,
    Origin,
    Message,
    Stacktrace,
    Exceptions,
    Raw,
    Source,
    Line,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "time" => Some(Self::Time),
            "level" => Some(Self::Level),
            "category" => Some(Self::Category),
            "origin" => Some(Self::Origin),
            "message" => Some(Self::Message),
            "stacktrace" => Some(Self::Stacktrace),
            "exceptions" | "exception" => Some(Self::Exceptions),
            "raw" => Some(Self::Raw),
            "source" | "file" => Some(Self::Source),
            "line" => Some(Self::Line),
            _ => None,
        }
    }
}

/// A parsed print template such as `{time} [{level}] {message}`
///
/// Unknown placeholders are printed literally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment<Placeholder>>,
}

impl Template {
    pub fn parse(template: &str) -> Self {
        Self {
            segments: parse_segments(template, Placeholder::from_name),
        }
    }

    /// Render a record into a string (no trailing newline)
    pub fn render(&self, entry: &Entry) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(field) => match field {
                    Placeholder::Time => out.push_str(entry.time()),
                    Placeholder::Level => out.push_str(entry.level()),
                    Placeholder::Category => out.push_str(entry.category()),
                    Placeholder::Origin => out.push_str(entry.origin()),
                    Placeholder::Message => out.push_str(entry.message()),
                    Placeholder::Stacktrace => out.push_str(entry.stacktrace()),
                    Placeholder::Exceptions => out.push_str(&entry.exceptions().join(", ")),
                    Placeholder::Raw => out.push_str(entry.raw_content()),
                    Placeholder::Source => out.push_str(entry.source()),
                    Placeholder::Line => out.push_str(&entry.line().to_string()),
                },
            }
        }
        out
    }
}

/// Writes every record as it arrives
pub struct PrintProcessor<W> {
    writer: W,
    format: PrintFormat,
}

impl<W: Write + Send> PrintProcessor<W> {
    pub fn new(writer: W, format: PrintFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Processor for PrintProcessor<W> {
    fn execute(&mut self, entry: &Entry) -> Result<(), ProcessorError> {
        match &self.format {
            PrintFormat::Raw => writeln!(self.writer, "{}", entry.raw_content())?,
            PrintFormat::Json => {
                serde_json::to_writer(&mut self.writer, entry)?;
                writeln!(self.writer)?;
            }
            PrintFormat::Template(template) => {
                writeln!(self.writer, "{}", template.render(entry))?;
            }
        }
        Ok(())
    }

    fn after(&mut self) -> Result<(), ProcessorError> {
        self.writer.flush()?;
        Ok(())
    }
}
