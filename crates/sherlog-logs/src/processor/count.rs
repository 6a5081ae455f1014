use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use sherlog_types::Entry;

use super::Processor;
use super::template::{Segment, parse_segments};
use crate::error::ProcessorError;
use crate::filter::Extractor;

/// Output format for count totals
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CountFormat {
    /// Titled, aligned `value: count` table per group
    #[default]
    Default,
    /// `group,value,count` rows
    Csv,
    /// `{"group": {"value": count}}`
    Json,
    /// One rendered line per counted value
    Template(CountTemplate),
}

impl FromStr for CountFormat {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ProcessorError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CountField {
    Group,
    Value,
    Count,
    Total,
}

impl CountField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "group" => Some(Self::Group),
            "value" => Some(Self::Value),
            "count" => Some(Self::Count),
            "total" => Some(Self::Total),
            _ => None,
        }
    }
}

/// A row template such as `{group}/{value}: {count}`
///
/// Placeholders are `{group}`, `{value}`, `{count}` and `{total}` (the
/// group's total). Unknown placeholders are printed literally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountTemplate {
    segments: Vec<Segment<CountField>>,
}

impl CountTemplate {
    pub fn parse(template: &str) -> Self {
        Self {
            segments: parse_segments(template, CountField::from_name),
        }
    }

    pub fn render(&self, group: &str, value: &str, count: u64, total: u64) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(CountField::Group) => out.push_str(group),
                Segment::Field(CountField::Value) => out.push_str(value),
                Segment::Field(CountField::Count) => out.push_str(&count.to_string()),
                Segment::Field(CountField::Total) => out.push_str(&total.to_string()),
            }
        }
        out
    }
}

/// Counts per distinct value of one field
#[derive(Clone, Debug)]
pub struct GroupCount {
    extractor: Extractor,
    values: BTreeMap<String, u64>,
}

impl GroupCount {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            extractor,
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.extractor.name()
    }

    fn add(&mut self, entry: &Entry) {
        for value in self.extractor.extract(entry) {
            *self.values.entry(value.to_string()).or_insert(0) += 1;
        }
    }

    /// Count for a value; unseen values count 0
    pub fn count(&self, value: &str) -> u64 {
        self.values.get(value).copied().unwrap_or(0)
    }

    /// Distinct values with their counts, sorted by value
    pub fn values(&self) -> &BTreeMap<String, u64> {
        &self.values
    }

    pub fn total(&self) -> u64 {
        self.values.values().sum()
    }
}

/// Counts records per field value and prints the totals at the end
pub struct CountProcessor<W> {
    groups: Vec<GroupCount>,
    format: CountFormat,
    writer: W,
}

impl<W: Write + Send> CountProcessor<W> {
    /// Create a counter for the named groups, e.g. `["level", "exception"]`
    pub fn new<S: AsRef<str>>(
        groups: &[S],
        format: CountFormat,
        writer: W,
    ) -> Result<Self, ProcessorError> {
        let mut counts: Vec<GroupCount> = Vec::with_capacity(groups.len());
        for name in groups {
            let name = name.as_ref();
            let extractor = Extractor::from_name(name)
                .ok_or_else(|| ProcessorError::UnknownGroup(name.to_string()))?;
            if counts.iter().all(|g| g.extractor != extractor) {
                counts.push(GroupCount::new(extractor));
            }
        }

        Ok(Self {
            groups: counts,
            format,
            writer,
        })
    }

    pub fn groups(&self) -> &[GroupCount] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&GroupCount> {
        let extractor = Extractor::from_name(name)?;
        self.groups.iter().find(|g| g.extractor == extractor)
    }

    /// Count for a value of a group; unknown groups and unseen values count 0
    pub fn count(&self, group: &str, value: &str) -> u64 {
        self.group(group).map_or(0, |g| g.count(value))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_default(&mut self) -> Result<(), ProcessorError> {
        for group in &self.groups {
            let key_width = group.values.keys().map(String::len).max().unwrap_or(0);
            let count_width = group
                .values
                .values()
                .map(|c| c.to_string().len())
                .max()
                .unwrap_or(0);

            writeln!(self.writer, "{}", title_case(group.name()))?;
            for (value, count) in &group.values {
                writeln!(
                    self.writer,
                    "{:<kw$}: {:>cw$}",
                    value,
                    count,
                    kw = key_width + 1,
                    cw = count_width
                )?;
            }
            writeln!(self.writer)?;
        }
        Ok(())
    }

    fn write_csv(&mut self) -> Result<(), ProcessorError> {
        for group in &self.groups {
            for (value, count) in &group.values {
                writeln!(
                    self.writer,
                    "{},{},{}",
                    csv_field(group.name()),
                    csv_field(value),
                    count
                )?;
            }
        }
        Ok(())
    }

    fn write_json(&mut self) -> Result<(), ProcessorError> {
        let totals: BTreeMap<&str, &BTreeMap<String, u64>> =
            self.groups.iter().map(|g| (g.name(), &g.values)).collect();
        serde_json::to_writer(&mut self.writer, &totals)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_template(&mut self) -> Result<(), ProcessorError> {
        let CountFormat::Template(template) = &self.format else {
            return Ok(());
        };
        for group in &self.groups {
            let total = group.total();
            for (value, count) in &group.values {
                let row = template.render(group.name(), value, *count, total);
                writeln!(self.writer, "{row}")?;
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> Processor for CountProcessor<W> {
    fn execute(&mut self, entry: &Entry) -> Result<(), ProcessorError> {
        for group in &mut self.groups {
            group.add(entry);
        }
        Ok(())
    }

    fn after(&mut self) -> Result<(), ProcessorError> {
        match self.format {
            CountFormat::Default => self.write_default()?,
            CountFormat::Csv => self.write_csv()?,
            CountFormat::Json => self.write_json()?,
            CountFormat::Template(_) => self.write_template()?,
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherlog_types::{Line, OpenEntry};

    const SAMPLES: [&str; 9] = [
        "lorem", "bacon", "bacon", "lorem", "meh", "bacon", "meh", "lorem", "bacon",
    ];

    fn run_counts<F>(group: &str, make: F) -> CountProcessor<Vec<u8>>
    where
        F: Fn(&mut OpenEntry, &str),
    {
        let mut processor = CountProcessor::new(&[group], CountFormat::Default, Vec::new()).unwrap();
        processor.before().unwrap();
        for value in SAMPLES {
            let mut open = OpenEntry::new(&Line::new("test", 1, value));
            make(&mut open, value);
            processor.execute(&open.close()).unwrap();
        }
        processor.after().unwrap();
        processor
    }

    fn assert_sample_counts(processor: &CountProcessor<Vec<u8>>, group: &str) {
        assert_eq!(processor.count(group, "lorem"), 3);
        assert_eq!(processor.count(group, "meh"), 2);
        assert_eq!(processor.count(group, "bacon"), 4);
        assert_eq!(processor.count(group, "foo"), 0);
        assert_eq!(processor.count(group, "bar"), 0);
    }

    #[test]
    fn test_count_by_level() {
        let processor = run_counts("level", |e, v| e.set_level(v));
        assert_sample_counts(&processor, "level");
        assert_eq!(processor.group("level").unwrap().total(), 9);
    }

    #[test]
    fn test_count_by_category() {
        let processor = run_counts("category", |e, v| e.set_category(v));
        assert_sample_counts(&processor, "category");
    }

    #[test]
    fn test_count_by_origin() {
        let processor = run_counts("origin", |e, v| e.set_origin(v));
        assert_sample_counts(&processor, "origin");
    }

    #[test]
    fn test_count_by_exception() {
        let processor = run_counts("exception", |e, v| e.add_exception(v));
        assert_sample_counts(&processor, "exception");
    }

    #[test]
    fn test_default_output() {
        let processor = run_counts("level", |e, v| e.set_level(v));
        let out = String::from_utf8(processor.into_inner()).unwrap();
        assert_eq!(out, "Level\nbacon : 4\nlorem : 3\nmeh   : 2\n\n");
    }

    #[test]
    fn test_csv_output() {
        let mut processor =
            CountProcessor::new(&["message"], CountFormat::Csv, Vec::new()).unwrap();
        for message in ["plain", "with, comma", "say \"hi\""] {
            let mut open = OpenEntry::new(&Line::new("t", 1, message));
            open.set_message(message);
            processor.execute(&open.close()).unwrap();
        }
        processor.after().unwrap();

        let out = String::from_utf8(processor.into_inner()).unwrap();
        assert_eq!(
            out,
            "message,plain,1\nmessage,\"say \"\"hi\"\"\",1\nmessage,\"with, comma\",1\n"
        );
    }

    #[test]
    fn test_json_output() {
        let mut processor =
            CountProcessor::new(&["level", "exception"], CountFormat::Json, Vec::new()).unwrap();
        let mut open = OpenEntry::new(&Line::new("t", 1, "x"));
        open.set_level("ERROR");
        open.add_exception("a.BException");
        processor.execute(&open.close()).unwrap();
        processor.after().unwrap();

        let out = String::from_utf8(processor.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["level"]["ERROR"], 1);
        assert_eq!(value["exception"]["a.BException"], 1);
    }

    #[test]
    fn test_template_output() {
        let template = CountTemplate::parse("{group}\t{value}\t{count}/{total} {nope}");
        let mut processor =
            CountProcessor::new(&["level"], CountFormat::Template(template), Vec::new()).unwrap();
        for level in ["WARN", "ERROR", "WARN"] {
            let mut open = OpenEntry::new(&Line::new("t", 1, level));
            open.set_level(level);
            processor.execute(&open.close()).unwrap();
        }
        processor.after().unwrap();

        let out = String::from_utf8(processor.into_inner()).unwrap();
        assert_eq!(out, "level\tERROR\t1/3 {nope}\nlevel\tWARN\t2/3 {nope}\n");
    }

    #[test]
    fn test_template_over_sample_counts() {
        let template = CountTemplate::parse("{value}={count}");
        let mut processor =
            CountProcessor::new(&["exception"], CountFormat::Template(template), Vec::new())
                .unwrap();
        for value in SAMPLES {
            let mut open = OpenEntry::new(&Line::new("test", 1, value));
            open.add_exception(value);
            processor.execute(&open.close()).unwrap();
        }
        processor.after().unwrap();

        let out = String::from_utf8(processor.into_inner()).unwrap();
        assert_eq!(out, "bacon=4\nlorem=3\nmeh=2\n");
    }

    #[test]
    fn test_unknown_group_rejected() {
        let result = CountProcessor::new(&["colour"], CountFormat::Default, Vec::new());
        assert!(matches!(result, Err(ProcessorError::UnknownGroup(g)) if g == "colour"));
    }

    #[test]
    fn test_duplicate_groups_collapse() {
        let processor =
            CountProcessor::new(&["level", "LEVEL", "exceptions", "exception"], CountFormat::Default, Vec::new())
                .unwrap();
        assert_eq!(processor.groups().len(), 2);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("csv".parse::<CountFormat>().unwrap(), CountFormat::Csv);
        assert_eq!("JSON".parse::<CountFormat>().unwrap(), CountFormat::Json);
        assert!("xml".parse::<CountFormat>().is_err());
    }
}
