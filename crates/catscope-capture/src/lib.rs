//! Logcat capture for catscope
//!
//! This crate provides line parsing, message filtering and the capture
//! delegate that runs the logcat process.

mod chain;
mod delegate;
mod filter;
mod parser;
mod subscriber;

pub use chain::{FilterChain, FilterId};
pub use delegate::{
    CaptureConfig, CaptureDelegate, DEFAULT_ARGUMENTS, DEFAULT_PROGRAM, OUTPUT_FORMAT_ARGUMENTS,
    RESPAWN_DELAY, admits, validate_arguments,
};
pub use filter::{MessageFilter, Span};
pub use parser::{LineParser, parse_line};
pub use subscriber::{ChannelSubscriber, FnSubscriber, Subscriber};

// Re-export types used in our public API
pub use catscope_types::{
    CatscopeError, DEFAULT_DATE_LAYOUT, DEFAULT_TEMPLATE, Message, MessageFormat, Priority, Result,
    format::format,
};
