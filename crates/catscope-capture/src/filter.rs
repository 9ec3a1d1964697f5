use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use catscope_types::{CatscopeError, Message, Priority, Result};

/// Which part of a message a pattern filter is matched against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Span {
    /// The canonical formatted line (see [`Message::formatted`])
    #[default]
    Full,
    Tag,
    Body,
}

impl FromStr for Span {
    type Err = CatscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "tag" => Ok(Self::Tag),
            "body" | "message" => Ok(Self::Body),
            other => Err(CatscopeError::UnsupportedConfiguration(format!(
                "unknown span {other:?} (expected full, tag or body)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Span(Span),
    PriorityLetter,
}

/// Regex predicate over a [`Message`]
///
/// The pattern must match the whole selected text, not just a substring of it.
#[derive(Clone)]
pub struct MessageFilter {
    /// Anchored regex
    regex: Regex,

    /// Original pattern string
    pattern: String,

    target: Target,

    /// Invert the decision
    reversed: bool,
}

impl MessageFilter {
    /// Create a filter matching the full formatted message
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            regex: Self::compile(pattern)?,
            pattern: pattern.to_string(),
            target: Target::Span(Span::Full),
            reversed: false,
        })
    }

    /// Create a filter that accepts only the given priorities
    ///
    /// The filter always looks at the priority letter; its span cannot be
    /// changed. An empty set accepts nothing (or everything once reversed).
    pub fn priorities<I>(priorities: I) -> Self
    where
        I: IntoIterator<Item = Priority>,
    {
        let letters: BTreeSet<Priority> = priorities.into_iter().collect();
        let pattern = letters
            .iter()
            .map(|p| p.letter())
            .collect::<Vec<_>>()
            .join("|");

        Self {
            regex: Self::compile(&pattern).expect("priority letters form a valid pattern"),
            pattern,
            target: Target::PriorityLetter,
            reversed: false,
        }
    }

    fn compile(pattern: &str) -> Result<Regex> {
        // Must be valid on its own, not only once wrapped.
        Regex::new(pattern)?;
        Ok(Regex::new(&format!("^(?:{pattern})$"))?)
    }

    /// Select the span to match against
    pub fn with_span(mut self, span: Span) -> Result<Self> {
        self.set_span(span)?;
        Ok(self)
    }

    /// Invert the match
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn set_span(&mut self, span: Span) -> Result<()> {
        match self.target {
            Target::PriorityLetter => Err(CatscopeError::UnsupportedConfiguration(
                "a priority filter always matches the priority letter".to_string(),
            )),
            Target::Span(_) => {
                self.target = Target::Span(span);
                Ok(())
            }
        }
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }

    /// The configured span, `None` for priority filters
    pub fn span(&self) -> Option<Span> {
        match self.target {
            Target::Span(span) => Some(span),
            Target::PriorityLetter => None,
        }
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn is_priority_filter(&self) -> bool {
        self.target == Target::PriorityLetter
    }

    /// Get the original pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check if a message passes this filter
    pub fn accepts(&self, message: &Message) -> bool {
        let found = match self.target {
            Target::PriorityLetter => self.regex.is_match(message.priority().letter()),
            Target::Span(Span::Full) => self.regex.is_match(&message.formatted()),
            Target::Span(Span::Tag) => self.regex.is_match(message.tag()),
            Target::Span(Span::Body) => self.regex.is_match(message.body()),
        };

        self.reversed != found
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFilter")
            .field("pattern", &self.pattern)
            .field("target", &self.target)
            .field("reversed", &self.reversed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn message(priority: Priority) -> Message {
        Message::new(
            DateTime::from_timestamp_millis(1_609_459_200_123).unwrap(),
            priority,
            1234,
            5678,
            "MyTag".to_string(),
            "hello world".to_string(),
            String::new(),
        )
    }

    #[test]
    fn test_priority_filter() {
        let filter = MessageFilter::priorities([Priority::Info]);
        assert!(filter.accepts(&message(Priority::Info)));
        assert!(!filter.accepts(&message(Priority::Debug)));
        assert_eq!(filter.span(), None);
    }

    #[test]
    fn test_priority_filter_rejects_span() {
        let mut filter = MessageFilter::priorities([Priority::Info, Priority::Warn]);
        for span in [Span::Full, Span::Tag, Span::Body] {
            assert!(matches!(
                filter.set_span(span),
                Err(CatscopeError::UnsupportedConfiguration(_))
            ));
        }
        assert!(filter.clone().with_span(Span::Tag).is_err());
        assert!(filter.accepts(&message(Priority::Warn)));
        assert!(!filter.accepts(&message(Priority::Error)));
    }

    #[test]
    fn test_priority_filter_ignores_body_content() {
        let filter = MessageFilter::priorities([Priority::Error]);
        let msg = Message::new(
            DateTime::from_timestamp_millis(0).unwrap(),
            Priority::Info,
            1,
            1,
            "E".to_string(),
            "E".to_string(),
            String::new(),
        );
        assert!(!filter.accepts(&msg));
    }

    #[test]
    fn test_empty_priority_set() {
        let filter = MessageFilter::priorities(Vec::<Priority>::new());
        assert!(!filter.accepts(&message(Priority::Info)));
        assert!(filter.reversed(true).accepts(&message(Priority::Info)));
    }

    #[test]
    fn test_tag_filter() {
        let filter = MessageFilter::new("My.*").unwrap().with_span(Span::Tag).unwrap();
        assert!(filter.accepts(&message(Priority::Info)));

        let filter = filter.reversed(true);
        assert!(!filter.accepts(&message(Priority::Info)));
    }

    #[test]
    fn test_set_reversed() {
        let mut filter = MessageFilter::priorities([Priority::Info]);
        filter.set_reversed(true);
        assert!(filter.is_reversed());
        assert!(!filter.accepts(&message(Priority::Info)));
        assert!(filter.accepts(&message(Priority::Debug)));

        filter.set_reversed(false);
        assert!(filter.accepts(&message(Priority::Info)));
    }

    #[test]
    fn test_whole_input_match() {
        let filter = MessageFilter::new("hello").unwrap().with_span(Span::Body).unwrap();
        assert!(!filter.accepts(&message(Priority::Info)));

        let filter = MessageFilter::new("hello.*").unwrap().with_span(Span::Body).unwrap();
        assert!(filter.accepts(&message(Priority::Info)));
    }

    #[test]
    fn test_alternation_is_grouped() {
        let filter = MessageFilter::new("foo|My").unwrap().with_span(Span::Tag).unwrap();
        assert!(!filter.accepts(&message(Priority::Info)));
        let filter = MessageFilter::new("foo|MyTag").unwrap().with_span(Span::Tag).unwrap();
        assert!(filter.accepts(&message(Priority::Info)));
    }

    #[test]
    fn test_full_span_uses_formatted_line() {
        let filter = MessageFilter::new(r".* I MyTag: hello world").unwrap();
        assert!(filter.accepts(&message(Priority::Info)));
        assert!(!filter.accepts(&message(Priority::Warn)));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            MessageFilter::new("(unclosed"),
            Err(CatscopeError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_span_from_str() {
        assert_eq!("TAG".parse::<Span>().unwrap(), Span::Tag);
        assert_eq!("message".parse::<Span>().unwrap(), Span::Body);
        assert!("pid".parse::<Span>().is_err());
    }
}
