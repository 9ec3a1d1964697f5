//! Shared types for catscope
//!
//! This crate contains the log priority scheme, the structured message record,
//! template rendering for messages and the error type used across the
//! catscope crates.

mod error;
pub mod format;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{CatscopeError, Result};
pub use format::{DEFAULT_DATE_LAYOUT, DEFAULT_TEMPLATE, MessageFormat};

// ============================================================================
// Priority Types
// ============================================================================

/// Log priority as defined by the Android logging facility
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    /// Reported by logcat with the letter `F`
    Assert,
}

impl Priority {
    /// All priorities, lowest first
    pub const ALL: [Priority; 6] = [
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Assert,
    ];

    /// Build a priority from its numeric code (`2..=7`)
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            2 => Ok(Self::Verbose),
            3 => Ok(Self::Debug),
            4 => Ok(Self::Info),
            5 => Ok(Self::Warn),
            6 => Ok(Self::Error),
            7 => Ok(Self::Assert),
            other => Err(CatscopeError::InvalidPriority(format!(
                "code {other} (valid codes are 2 through 7)"
            ))),
        }
    }

    /// Build a priority from its single letter. Case-sensitive.
    pub fn from_letter(letter: &str) -> Result<Self> {
        match letter {
            "V" => Ok(Self::Verbose),
            "D" => Ok(Self::Debug),
            "I" => Ok(Self::Info),
            "W" => Ok(Self::Warn),
            "E" => Ok(Self::Error),
            "F" => Ok(Self::Assert),
            other => Err(CatscopeError::InvalidPriority(format!(
                "letter {other:?} (valid letters are V, D, I, W, E and F)"
            ))),
        }
    }

    /// Numeric code
    pub fn code(&self) -> i32 {
        match self {
            Self::Verbose => 2,
            Self::Debug => 3,
            Self::Info => 4,
            Self::Warn => 5,
            Self::Error => 6,
            Self::Assert => 7,
        }
    }

    /// Single upper-case letter
    pub fn letter(&self) -> &'static str {
        match self {
            Self::Verbose => "V",
            Self::Debug => "D",
            Self::Info => "I",
            Self::Warn => "W",
            Self::Error => "E",
            Self::Assert => "F",
        }
    }

    /// Upper-case name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Assert => "ASSERT",
        }
    }

    /// This priority and every priority above it
    pub fn at_least(self) -> Vec<Priority> {
        Self::ALL.into_iter().filter(|p| *p >= self).collect()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = CatscopeError;

    /// Accepts a letter (`W`) or a name in any case (`warn`)
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(priority) = Self::from_letter(s) {
            return Ok(priority);
        }
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CatscopeError::InvalidPriority(format!("{s:?}")))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A single parsed logcat line
///
/// Messages are produced by the line parser and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    logged_at: DateTime<Utc>,
    priority: Priority,
    pid: u32,
    tid: u32,
    tag: String,
    body: String,
    #[serde(skip)]
    raw: String,
}

impl Message {
    pub fn new(
        logged_at: DateTime<Utc>,
        priority: Priority,
        pid: u32,
        tid: u32,
        tag: String,
        body: String,
        raw: String,
    ) -> Self {
        Self {
            logged_at,
            priority,
            pid,
            tid,
            tag,
            body,
            raw,
        }
    }

    /// When the message was logged, with millisecond resolution
    pub fn logged_at(&self) -> DateTime<Utc> {
        self.logged_at
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Thread ID
    pub fn tid(&self) -> u32 {
        self.tid
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Free-form message text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The original unparsed line
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical text form, rendered with [`DEFAULT_TEMPLATE`]
    pub fn formatted(&self) -> String {
        format::format(self, DEFAULT_TEMPLATE, DEFAULT_DATE_LAYOUT)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}
