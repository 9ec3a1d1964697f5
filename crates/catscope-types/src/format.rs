//! Template rendering for messages.
//!
//! Recognized specifiers:
//!
//! | Specifier | Output |
//! |---|---|
//! | `%d`  | timestamp rendered with the date layout (chrono strftime syntax, UTC) |
//! | `%de` | timestamp as epoch seconds with three fractional digits (`ss.SSS`) |
//! | `%v`  | priority name |
//! | `%vi` | priority numeric code |
//! | `%vc` | priority letter |
//! | `%p`  | process ID |
//! | `%r`  | thread ID |
//! | `%t`  | tag |
//! | `%m`  | message body |
//!
//! Anything else, including unknown `%` sequences, is copied through.

use chrono::format::{Item, StrftimeItems};
use std::fmt::Write;

use crate::{CatscopeError, Message, Result};

/// Template used for the canonical text form of a message
pub const DEFAULT_TEMPLATE: &str = "%de %p %r %vc %t: %m";

/// ISO-8601 with milliseconds
pub const DEFAULT_DATE_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

// Longer specifiers come first so `%de` wins over `%d` and `%vi` over `%v`.
const SPECIFIERS: [&str; 9] = ["%de", "%d", "%vi", "%vc", "%v", "%p", "%r", "%t", "%m"];

/// A validated template and date layout pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageFormat {
    template: String,
    date_layout: String,
}

impl MessageFormat {
    /// Create a format, rejecting date layouts chrono cannot render
    pub fn new(template: impl Into<String>, date_layout: impl Into<String>) -> Result<Self> {
        let date_layout = date_layout.into();
        if !is_valid_layout(&date_layout) {
            return Err(CatscopeError::UnsupportedConfiguration(format!(
                "invalid date layout {date_layout:?}"
            )));
        }
        Ok(Self {
            template: template.into(),
            date_layout,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn date_layout(&self) -> &str {
        &self.date_layout
    }

    pub fn render(&self, message: &Message) -> String {
        format(message, &self.template, &self.date_layout)
    }
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            date_layout: DEFAULT_DATE_LAYOUT.to_string(),
        }
    }
}

/// Render a message with the given template and date layout
///
/// Substitution is a single left-to-right pass, so specifier-like text inside
/// the tag or body is never expanded. When `date_layout` is not a valid
/// strftime layout, `%d` is left as is.
pub fn format(message: &Message, template: &str, date_layout: &str) -> String {
    let mut out = String::with_capacity(template.len() + message.body().len() + 32);
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match SPECIFIERS.iter().find(|spec| tail.starts_with(**spec)) {
            Some(spec) => {
                render_specifier(&mut out, spec, message, date_layout);
                rest = &tail[spec.len()..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_specifier(out: &mut String, spec: &str, message: &Message, date_layout: &str) {
    match spec {
        "%de" => {
            let millis = message.logged_at().timestamp_millis();
            let _ = write!(out, "{}.{:03}", millis.div_euclid(1000), millis.rem_euclid(1000));
        }
        "%d" => {
            if is_valid_layout(date_layout) {
                let _ = write!(out, "{}", message.logged_at().format(date_layout));
            } else {
                out.push_str(spec);
            }
        }
        "%vi" => {
            let _ = write!(out, "{}", message.priority().code());
        }
        "%vc" => out.push_str(message.priority().letter()),
        "%v" => out.push_str(message.priority().name()),
        "%p" => {
            let _ = write!(out, "{}", message.pid());
        }
        "%r" => {
            let _ = write!(out, "{}", message.tid());
        }
        "%t" => out.push_str(message.tag()),
        "%m" => out.push_str(message.body()),
        other => out.push_str(other),
    }
}

fn is_valid_layout(layout: &str) -> bool {
    !StrftimeItems::new(layout).any(|item| matches!(item, Item::Error))
}
