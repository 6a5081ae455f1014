use regex::Regex;

use sherlog_types::{Entry, Line, OpenEntry};

/// Compiled layout for turning raw lines into records
///
/// `entry` marks the first line of a record and binds the named groups
/// `time`, `level`, `category`, `origin` and `message`. `exception` binds
/// `exception` groups; `stacktrace` classifies continuation lines.
#[derive(Clone, Debug)]
pub struct RegexMapper {
    entry: Regex,
    exception: Option<Regex>,
    stacktrace: Option<Regex>,
}

impl RegexMapper {
    pub fn new(entry: Regex, exception: Option<Regex>, stacktrace: Option<Regex>) -> Self {
        Self {
            entry,
            exception,
            stacktrace,
        }
    }

    pub fn entry(&self) -> &Regex {
        &self.entry
    }

    pub fn exception(&self) -> Option<&Regex> {
        self.exception.as_ref()
    }

    pub fn stacktrace(&self) -> Option<&Regex> {
        self.stacktrace.as_ref()
    }

    /// Start a fresh mapping session
    pub fn start(&self, scan_continuations: bool) -> MapperState {
        MapperState {
            mapper: self.clone(),
            scan_continuations,
            open: None,
        }
    }

    fn scan_exceptions(&self, text: &str, entry: &mut OpenEntry) {
        let Some(pattern) = &self.exception else {
            return;
        };
        for caps in pattern.captures_iter(text) {
            if let Some(m) = caps.name("exception") {
                entry.add_exception(m.as_str());
            }
        }
    }
}

/// Record assembly state for one sequential stream of lines
///
/// Holds at most one open record. Lines arriving while no record is open are
/// dropped: there is nothing to attach them to.
#[derive(Debug)]
pub struct MapperState {
    mapper: RegexMapper,
    scan_continuations: bool,
    open: Option<OpenEntry>,
}

impl MapperState {
    /// Feed one line; returns the record it closed, if any
    pub fn push(&mut self, line: Line) -> Option<Entry> {
        // Entry detection wins over stacktrace detection
        if let Some(caps) = self.mapper.entry.captures(&line.content) {
            let closed = self.open.take().map(OpenEntry::close);

            let mut entry = OpenEntry::new(&line);
            if let Some(m) = caps.name("time") {
                entry.set_time(m.as_str());
            }
            if let Some(m) = caps.name("level") {
                entry.set_level(m.as_str());
            }
            if let Some(m) = caps.name("category") {
                entry.set_category(m.as_str());
            }
            if let Some(m) = caps.name("origin") {
                entry.set_origin(m.as_str());
            }
            if let Some(m) = caps.name("message") {
                entry.set_message(m.as_str());
                self.mapper.scan_exceptions(m.as_str(), &mut entry);
            }

            self.open = Some(entry);
            return closed;
        }

        match self.open.as_mut() {
            Some(entry) => {
                let is_stacktrace = self
                    .mapper
                    .stacktrace
                    .as_ref()
                    .is_some_and(|re| re.is_match(&line.content));
                if is_stacktrace {
                    entry.add_stacktrace(&line.content);
                } else {
                    entry.append(&line.content);
                }
                if self.scan_continuations {
                    self.mapper.scan_exceptions(&line.content, entry);
                }
            }
            None => {
                tracing::trace!(
                    source = %line.source,
                    index = line.index,
                    "dropping line outside of any record"
                );
            }
        }
        None
    }

    /// Close the stream, returning the record still open
    pub fn finish(&mut self) -> Option<Entry> {
        self.open.take().map(OpenEntry::close)
    }

    /// Whether a record is currently accepting continuation lines
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
