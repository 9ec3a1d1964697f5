//! Configuration file loading and merging with command line flags.
//!
//! ```toml
//! args = "-b main -b crash"
//! format = "%d %v %t: %m"
//!
//! [[filter]]
//! pattern = "MyApp.*"
//! span = "tag"
//!
//! [[filter]]
//! priorities = "WEF"
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use catscope_capture::{
    CaptureConfig, DEFAULT_ARGUMENTS, DEFAULT_DATE_LAYOUT, DEFAULT_PROGRAM, DEFAULT_TEMPLATE,
    MessageFilter, MessageFormat, Priority, Span,
};

use crate::cli::Args;

/// Contents of a configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Capture program
    pub program: Option<String>,

    /// Capture arguments
    pub args: Option<String>,

    /// Output template
    pub format: Option<String>,

    /// strftime layout for %d
    pub date_format: Option<String>,

    /// Print JSON instead of a template
    pub json: bool,

    /// Filters, applied before any given on the command line
    #[serde(rename = "filter")]
    pub filters: Vec<FilterConfig>,
}

/// One `[[filter]]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Regex matched against the whole span
    pub pattern: Option<String>,

    /// `full`, `tag` or `body`
    pub span: Option<String>,

    /// Keep non-matching messages instead
    pub reversed: bool,

    /// Priority letters; makes this a priority filter
    pub priorities: Option<String>,
}

impl Config {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl FilterConfig {
    pub fn build(&self) -> Result<MessageFilter> {
        if let Some(letters) = &self.priorities {
            if self.pattern.is_some() || self.span.is_some() {
                bail!("a priority filter takes neither a pattern nor a span");
            }
            return Ok(MessageFilter::priorities(parse_priority_letters(letters)?)
                .reversed(self.reversed));
        }

        let Some(pattern) = &self.pattern else {
            bail!("filter needs either a pattern or priorities");
        };
        let span = match &self.span {
            Some(span) => span.parse::<Span>()?,
            None => Span::Full,
        };

        Ok(MessageFilter::new(pattern)?
            .with_span(span)?
            .reversed(self.reversed))
    }
}

/// `"IWE"` -> `[Info, Warn, Error]`
pub fn parse_priority_letters(letters: &str) -> Result<Vec<Priority>> {
    letters
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| Ok(Priority::from_letter(c.encode_utf8(&mut [0; 4]))?))
        .collect()
}

/// Output mode
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Text(MessageFormat),
    Json,
}

/// Everything needed to run, after merging the file and the flags
#[derive(Debug)]
pub struct Settings {
    pub capture: CaptureConfig,
    pub filters: Vec<MessageFilter>,
    pub output: Output,
}

impl Settings {
    /// Command line flags win over the file; filters from both are kept
    pub fn resolve(args: &Args, file: Config) -> Result<Self> {
        let capture = CaptureConfig {
            program: args
                .program
                .clone()
                .or(file.program)
                .unwrap_or_else(|| DEFAULT_PROGRAM.to_string()),
            arguments: args
                .capture_args
                .clone()
                .or(file.args)
                .unwrap_or_else(|| DEFAULT_ARGUMENTS.to_string()),
        };

        let output = if args.json || file.json {
            Output::Json
        } else {
            let template = args
                .format
                .clone()
                .or(file.format)
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
            let layout = args
                .date_format
                .clone()
                .or(file.date_format)
                .unwrap_or_else(|| DEFAULT_DATE_LAYOUT.to_string());
            Output::Text(MessageFormat::new(template, layout)?)
        };

        let mut filters = Vec::new();
        for (i, filter) in file.filters.iter().enumerate() {
            filters.push(
                filter
                    .build()
                    .with_context(|| format!("filter #{} in config file", i + 1))?,
            );
        }

        for pattern in &args.tag {
            filters.push(pattern_filter(pattern, Span::Tag, false, "--tag")?);
        }
        for pattern in &args.exclude_tag {
            filters.push(pattern_filter(pattern, Span::Tag, true, "--exclude-tag")?);
        }
        for pattern in &args.body {
            filters.push(pattern_filter(pattern, Span::Body, false, "--body")?);
        }
        for pattern in &args.grep {
            filters.push(pattern_filter(pattern, Span::Full, false, "--grep")?);
        }
        if let Some(letters) = &args.priority {
            let priorities = parse_priority_letters(letters).context("--priority")?;
            filters.push(MessageFilter::priorities(priorities));
        }
        if let Some(min) = args.min_priority {
            filters.push(MessageFilter::priorities(min.at_least()));
        }

        Ok(Self {
            capture,
            filters,
            output,
        })
    }
}

fn pattern_filter(pattern: &str, span: Span, reversed: bool, flag: &str) -> Result<MessageFilter> {
    let filter = MessageFilter::new(pattern)
        .with_context(|| format!("{flag} {pattern:?}"))?
        .with_span(span)?
        .reversed(reversed);
    Ok(filter)
}
