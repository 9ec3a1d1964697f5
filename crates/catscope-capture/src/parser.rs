use chrono::DateTime;
use regex::Regex;
use std::sync::LazyLock;

use catscope_types::{Message, Priority};

/// `threadtime,epoch` line shape:
/// `<secs>[.<millis>] <pid> <tid> <letter> <tag>: <body>`
static THREADTIME_EPOCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^ *(?P<secs>[0-9]+)(?:\.(?P<frac>[0-9]{1,3}))?\s+(?P<pid>[0-9]+)\s+(?P<tid>[0-9]+)\s+(?P<prio>[A-Za-z])\s+(?P<tag>[^:]*?)\s*:(?:\s+(?P<body>.*))?$",
    )
    .expect("threadtime pattern is valid")
});

/// Parser for logcat `threadtime,epoch` output
pub struct LineParser;

impl LineParser {
    /// Parse one raw line into a [`Message`]
    ///
    /// Returns `None` for lines that do not have the expected shape, carry an
    /// unknown priority letter, or hold numbers out of range. Such lines are
    /// normal in a capture stream (buffer banners, wrapped output).
    pub fn parse(raw: &str) -> Option<Message> {
        let caps = THREADTIME_EPOCH.captures(raw)?;

        let priority = Priority::from_letter(&caps["prio"]).ok()?;

        let seconds: i64 = caps["secs"].parse().ok()?;
        let millis = caps
            .name("frac")
            .map(|m| Self::fraction_to_millis(m.as_str()))
            .unwrap_or(0);
        let timestamp = seconds.checked_mul(1000)?.checked_add(millis)?;
        let logged_at = DateTime::from_timestamp_millis(timestamp)?;

        let pid: u32 = caps["pid"].parse().ok()?;
        let tid: u32 = caps["tid"].parse().ok()?;

        let tag = caps["tag"].to_string();
        let body = caps
            .name("body")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Some(Message::new(
            logged_at,
            priority,
            pid,
            tid,
            tag,
            body,
            raw.to_string(),
        ))
    }

    /// `"1"` -> 100, `"12"` -> 120, `"123"` -> 123
    fn fraction_to_millis(digits: &str) -> i64 {
        digits
            .bytes()
            .chain(std::iter::repeat(b'0'))
            .take(3)
            .fold(0, |acc, b| acc * 10 + i64::from(b - b'0'))
    }
}

/// Shorthand for [`LineParser::parse`]
pub fn parse_line(raw: &str) -> Option<Message> {
    LineParser::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threadtime_epoch() {
        let line = "  1609459200.123  1234  5678 I MyTag: hello world";
        let msg = LineParser::parse(line).unwrap();
        assert_eq!(msg.pid(), 1234);
        assert_eq!(msg.tid(), 5678);
        assert_eq!(msg.priority(), Priority::Info);
        assert_eq!(msg.tag(), "MyTag");
        assert_eq!(msg.body(), "hello world");
        assert_eq!(msg.logged_at().timestamp_millis(), 1_609_459_200_123);
        assert_eq!(msg.raw(), line);
    }

    #[test]
    fn test_parse_line_shorthand() {
        let line = "1609459200.5 10 20 E Tag: boom";
        assert_eq!(parse_line(line), LineParser::parse(line));
        assert!(parse_line("--------- beginning of crash").is_none());
    }

    #[test]
    fn test_parse_without_fraction() {
        let msg = LineParser::parse("1609459200 1 2 W Tag: body").unwrap();
        assert_eq!(msg.logged_at().timestamp_millis(), 1_609_459_200_000);
        assert_eq!(msg.priority(), Priority::Warn);
    }

    #[test]
    fn test_parse_short_fraction() {
        let msg = LineParser::parse("10.5 1 2 D Tag: body").unwrap();
        assert_eq!(msg.logged_at().timestamp_millis(), 10_500);
        let msg = LineParser::parse("10.05 1 2 D Tag: body").unwrap();
        assert_eq!(msg.logged_at().timestamp_millis(), 10_050);
    }

    #[test]
    fn test_parse_assert_letter() {
        let msg = LineParser::parse("1.000 1 2 F libc: Fatal signal 6").unwrap();
        assert_eq!(msg.priority(), Priority::Assert);
        assert_eq!(msg.body(), "Fatal signal 6");
    }

    #[test]
    fn test_missing_priority_letter() {
        assert!(LineParser::parse("1609459200.123 1234 5678 MyTag: hello").is_none());
    }

    #[test]
    fn test_invalid_priority_letter() {
        assert!(LineParser::parse("1609459200.123 1234 5678 X MyTag: hello").is_none());
        assert!(LineParser::parse("1609459200.123 1234 5678 i MyTag: hello").is_none());
    }

    #[test]
    fn test_non_message_lines() {
        assert!(LineParser::parse("--------- beginning of main").is_none());
        assert!(LineParser::parse("").is_none());
        assert!(LineParser::parse("    at com.example.Foo.bar(Foo.java:10)").is_none());
    }

    #[test]
    fn test_body_keeps_colons() {
        let msg = LineParser::parse(
            "1.000 100 200 I ActivityManager: Start proc 4321:com.example/u0a12",
        )
        .unwrap();
        assert_eq!(msg.tag(), "ActivityManager");
        assert_eq!(msg.body(), "Start proc 4321:com.example/u0a12");
    }

    #[test]
    fn test_padded_tag_and_empty_body() {
        let msg = LineParser::parse("1.000 100 200 V chatty  :").unwrap();
        assert_eq!(msg.tag(), "chatty");
        assert_eq!(msg.body(), "");

        let msg = LineParser::parse("1.000 100 200 V : anonymous").unwrap();
        assert_eq!(msg.tag(), "");
        assert_eq!(msg.body(), "anonymous");
    }

    #[test]
    fn test_out_of_range_pid() {
        assert!(LineParser::parse("1.000 99999999999 2 I Tag: body").is_none());
    }

    #[test]
    fn test_parse_multibyte_utf8_no_panic() {
        let msg = LineParser::parse("1.000 1 2 I Tag: ╭──╮ ünïcödé").unwrap();
        assert_eq!(msg.body(), "╭──╮ ünïcödé");
        assert!(LineParser::parse("─────────────────────").is_none());
    }
}
