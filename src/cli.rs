use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, ArgMatches, Args, Parser, Subcommand};

use sherlog_logs::{Defaults, Extractor, FilterBuilder, FilterError, FilterToken, Predicate};

/// Layout used when neither the command line nor the config file picks one
pub const DEFAULT_LAYOUT: &str = "base.java";

/// Sherlog - reassemble, filter and summarize multi-line logs
#[derive(Parser, Debug)]
#[command(name = "sherlog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Load layouts and defaults from a TOML file
    #[arg(short, long, global = true, env = "SHERLOG_CONFIG_FILE", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Layout used to split lines into records
    #[arg(short, long, global = true, value_name = "ID")]
    pub layout: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Layout to use: command line, then config defaults, then [`DEFAULT_LAYOUT`]
    pub fn layout<'a>(&'a self, defaults: &'a Defaults) -> &'a str {
        self.layout
            .as_deref()
            .or(defaults.layout.as_deref())
            .unwrap_or(DEFAULT_LAYOUT)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the matching records
    Print {
        #[command(flatten)]
        run: RunArgs,

        /// Output format: raw, json or a template such as "{level} {message}"
        #[arg(short, long, default_value = "raw")]
        format: String,
    },

    /// Count the matching records per field value
    Count {
        #[command(flatten)]
        run: RunArgs,

        /// Field to count by (repeatable or comma separated)
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_value = "level,category,exception"
        )]
        group: Vec<String>,

        /// Output format: default, csv or json
        #[arg(short, long, default_value = "default")]
        output: String,

        /// Render each counted value with the template in FILE
        /// ({group}, {value}, {count} and {total})
        #[arg(short, long, value_name = "FILE", conflicts_with = "output")]
        template: Option<PathBuf>,
    },
}

impl Command {
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Self::Print { run, .. } | Self::Count { run, .. } => run,
        }
    }
}

/// Options shared by every command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Stop after this many matching records (negative = unlimited)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub max: i64,

    /// Also search continuation lines for exceptions (`--search-stacktrace=false` turns it off)
    #[arg(
        short,
        long,
        env = "SHERLOG_SEARCH_STACKTRACE",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub search_stacktrace: Option<bool>,

    /// Log files to read; `-` reads standard input
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

impl RunArgs {
    /// Record limit, `None` when unlimited
    pub fn limit(&self) -> Option<u64> {
        u64::try_from(self.max).ok()
    }

    /// Whether continuation lines are scanned; an explicit flag or env value wins over the config
    pub fn scan_continuations(&self, defaults: &Defaults) -> bool {
        self.search_stacktrace
            .or(defaults.search_stacktrace)
            .unwrap_or(false)
    }
}

/// Filter flags; they combine in the order given on the command line
///
/// Only declared here: [`filter_tokens`] reads them from the raw matches.
#[allow(dead_code)]
#[derive(Args, Debug)]
#[command(next_help_heading = "Filters")]
pub struct FilterArgs {
    /// Keep records with this timestamp
    #[arg(long, value_name = "VALUE")]
    pub time: Vec<String>,

    /// Keep records with this level
    #[arg(long, value_name = "VALUE")]
    pub level: Vec<String>,

    /// Keep records with this category
    #[arg(long, value_name = "VALUE")]
    pub category: Vec<String>,

    /// Keep records with this origin
    #[arg(long, value_name = "VALUE")]
    pub origin: Vec<String>,

    /// Keep records with this message
    #[arg(long, value_name = "VALUE")]
    pub message: Vec<String>,

    /// Keep records whose stacktrace contains this text
    #[arg(long, value_name = "VALUE")]
    pub stacktrace: Vec<String>,

    /// Keep records with this exception
    #[arg(long, value_name = "VALUE")]
    pub exception: Vec<String>,

    /// Treat the next filter value as a regular expression
    #[arg(long, action = ArgAction::Count)]
    pub matches: u8,

    /// Match the next filter value as a substring
    #[arg(long, action = ArgAction::Count)]
    pub contains: u8,

    /// Negate the next filter
    #[arg(long, action = ArgAction::Count)]
    pub not: u8,

    /// Combine the next filter with OR instead of AND
    #[arg(long, action = ArgAction::Count)]
    pub or: u8,
}

const MODIFIERS: [(&str, FilterToken); 4] = [
    ("matches", FilterToken::Matches),
    ("contains", FilterToken::Contains),
    ("not", FilterToken::Not),
    ("or", FilterToken::Or),
];

/// Filter tokens of a command in command-line order
///
/// Derived structs lose the relative order of different flags, so the
/// positions are read back from the raw matches.
pub fn filter_tokens(matches: &ArgMatches) -> Vec<FilterToken> {
    let mut tokens: Vec<(usize, FilterToken)> = Vec::new();

    for extractor in Extractor::ALL {
        let id = extractor.name();
        if let (Some(indices), Some(values)) =
            (matches.indices_of(id), matches.get_many::<String>(id))
        {
            tokens.extend(
                indices
                    .zip(values)
                    .map(|(index, value)| (index, FilterToken::Field(extractor, value.clone()))),
            );
        }
    }

    for (id, token) in MODIFIERS {
        if let Some(indices) = matches.indices_of(id) {
            tokens.extend(indices.map(|index| (index, token.clone())));
        }
    }

    tokens.sort_by_key(|(index, _)| *index);
    tokens.into_iter().map(|(_, token)| token).collect()
}

/// Build the record filter of a command
pub fn build_filter(matches: &ArgMatches) -> Result<Predicate, FilterError> {
    let mut builder = FilterBuilder::new();
    builder.extend(filter_tokens(matches))?;
    Ok(builder.build())
}
