use regex::Regex;
use std::fmt;

use sherlog_types::Entry;

use crate::error::FilterError;

/// Record field a condition looks at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Extractor {
    Time,
    Level,
    Category,
    Origin,
    Message,
    Stacktrace,
    Exception,
}

impl Extractor {
    pub const ALL: [Self; 7] = [
        Self::Time,
        Self::Level,
        Self::Category,
        Self::Origin,
        Self::Message,
        Self::Stacktrace,
        Self::Exception,
    ];

    /// Values of this field, in record order
    ///
    /// Every field yields exactly one value except `Exception`, which yields
    /// one per exception found (possibly none).
    pub fn extract(self, entry: &Entry) -> Vec<&str> {
        match self {
            Self::Time => vec![entry.time()],
            Self::Level => vec![entry.level()],
            Self::Category => vec![entry.category()],
            Self::Origin => vec![entry.origin()],
            Self::Message => vec![entry.message()],
            Self::Stacktrace => vec![entry.stacktrace()],
            Self::Exception => entry.exceptions().iter().map(String::as_str).collect(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Level => "level",
            Self::Category => "category",
            Self::Origin => "origin",
            Self::Message => "message",
            Self::Stacktrace => "stacktrace",
            Self::Exception => "exception",
        }
    }

    /// Parse a field name as used on the command line and in count groups
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "time" | "timestamp" => Some(Self::Time),
            "level" => Some(Self::Level),
            "category" => Some(Self::Category),
            "origin" => Some(Self::Origin),
            "message" => Some(Self::Message),
            "stacktrace" => Some(Self::Stacktrace),
            "exception" | "exceptions" => Some(Self::Exception),
            _ => None,
        }
    }

    /// Operation used when none is requested explicitly
    pub fn default_operation(self) -> Operation {
        match self {
            Self::Stacktrace => Operation::Contains,
            _ => Operation::Equals,
        }
    }
}

/// How a literal is compared to extracted values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Equals,
    Contains,
    Matches,
}

#[derive(Clone)]
enum Matcher {
    Equals(String),
    Contains(String),
    Matches(Regex),
}

impl Matcher {
    fn test(&self, value: &str) -> bool {
        match self {
            Self::Equals(literal) => value == literal,
            Self::Contains(literal) => value.contains(literal.as_str()),
            Self::Matches(re) => re.is_match(value),
        }
    }
}

/// A single extractor/operation/literal test
#[derive(Clone)]
pub struct Condition {
    extractor: Extractor,
    matcher: Matcher,
}

impl Condition {
    /// Build a condition; `Matches` compiles the literal once here
    pub fn new(extractor: Extractor, operation: Operation, value: &str) -> Result<Self, FilterError> {
        let matcher = match operation {
            Operation::Equals => Matcher::Equals(value.to_string()),
            Operation::Contains => Matcher::Contains(value.to_string()),
            Operation::Matches => Matcher::Matches(Regex::new(value)?),
        };
        Ok(Self { extractor, matcher })
    }

    pub fn equals(extractor: Extractor, value: &str) -> Self {
        Self {
            extractor,
            matcher: Matcher::Equals(value.to_string()),
        }
    }

    pub fn contains(extractor: Extractor, value: &str) -> Self {
        Self {
            extractor,
            matcher: Matcher::Contains(value.to_string()),
        }
    }

    pub fn matches(extractor: Extractor, pattern: &str) -> Result<Self, FilterError> {
        Self::new(extractor, Operation::Matches, pattern)
    }

    pub fn extractor(&self) -> Extractor {
        self.extractor
    }

    pub fn operation(&self) -> Operation {
        match self.matcher {
            Matcher::Equals(_) => Operation::Equals,
            Matcher::Contains(_) => Operation::Contains,
            Matcher::Matches(_) => Operation::Matches,
        }
    }

    /// The literal or pattern this condition compares against
    pub fn value(&self) -> &str {
        match &self.matcher {
            Matcher::Equals(v) | Matcher::Contains(v) => v,
            Matcher::Matches(re) => re.as_str(),
        }
    }

    /// True if any extracted value satisfies the operation
    pub fn test(&self, entry: &Entry) -> bool {
        self.extractor
            .extract(entry)
            .into_iter()
            .any(|value| self.matcher.test(value))
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("extractor", &self.extractor)
            .field("operation", &self.operation())
            .field("value", &self.value())
            .finish()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.operation() {
            Operation::Equals => "==",
            Operation::Contains => "contains",
            Operation::Matches => "=~",
        };
        write!(f, "{} {} {:?}", self.extractor.name(), op, self.value())
    }
}

/// Boolean expression over records
///
/// Built completely before a run starts. [`Predicate::All`] matches every
/// record and is the identity for [`Predicate::and`].
#[derive(Clone, Debug, Default)]
pub enum Predicate {
    #[default]
    All,
    Condition(Condition),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn condition(
        extractor: Extractor,
        operation: Operation,
        value: &str,
    ) -> Result<Self, FilterError> {
        Condition::new(extractor, operation, value).map(Self::Condition)
    }

    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, p) | (p, Self::All) => p,
            (a, b) => Self::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against a record, short-circuiting
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::All => true,
            Self::Condition(c) => c.test(entry),
            Self::And(a, b) => a.matches(entry) && b.matches(entry),
            Self::Or(a, b) => a.matches(entry) || b.matches(entry),
            Self::Not(p) => !p.matches(entry),
        }
    }

    /// Check if the predicate accepts everything without looking
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl std::ops::Not for Predicate {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Condition(c) => write!(f, "{c}"),
            Self::And(a, b) => write!(f, "({a} AND {b})"),
            Self::Or(a, b) => write!(f, "({a} OR {b})"),
            Self::Not(p) => write!(f, "NOT {p}"),
        }
    }
}

/// One element of a left-to-right filter expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterToken {
    /// Combine the next condition with OR instead of AND
    Or,
    /// Negate the next condition
    Not,
    /// Use `contains` for the next condition
    Contains,
    /// Use `matches` for the next condition
    Matches,
    /// A condition on a field
    Field(Extractor, String),
}

/// Folds a token sequence such as `a OR b AND NOT c` into a predicate
///
/// Conditions are combined strictly in arrival order: the example above
/// becomes `((a OR b) AND NOT c)`. Modifiers apply to the next `Field` only.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    predicate: Option<Predicate>,
    or_next: bool,
    not_next: bool,
    operation_next: Option<Operation>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: FilterToken) -> Result<(), FilterError> {
        match token {
            FilterToken::Or => self.or_next = true,
            FilterToken::Not => self.not_next = true,
            FilterToken::Contains => self.operation_next = Some(Operation::Contains),
            FilterToken::Matches => self.operation_next = Some(Operation::Matches),
            FilterToken::Field(extractor, value) => {
                let operation = self
                    .operation_next
                    .take()
                    .unwrap_or_else(|| extractor.default_operation());
                let mut next = Predicate::condition(extractor, operation, &value)?;
                if std::mem::take(&mut self.not_next) {
                    next = next.negate();
                }
                let or = std::mem::take(&mut self.or_next);
                self.predicate = Some(match self.predicate.take() {
                    None => next,
                    Some(current) if or => current.or(next),
                    Some(current) => current.and(next),
                });
            }
        }
        Ok(())
    }

    pub fn extend<I>(&mut self, tokens: I) -> Result<(), FilterError>
    where
        I: IntoIterator<Item = FilterToken>,
    {
        tokens.into_iter().try_for_each(|token| self.push(token))
    }

    /// Finish; no conditions at all yields [`Predicate::All`]
    pub fn build(self) -> Predicate {
        if self.or_next || self.not_next || self.operation_next.is_some() {
            tracing::warn!("ignoring filter modifier with no following condition");
        }
        self.predicate.unwrap_or_default()
    }
}
