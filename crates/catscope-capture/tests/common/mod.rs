#![allow(dead_code)]
//! Shared helpers for the capture harnesses.
//!
//! The delegate is pointed at `sh <script>` instead of a real `logcat`, so the
//! "capture process" is a throwaway shell script that prints canned lines.
//! The fixed `-v threadtime,epoch` arguments end up as `$@` of the script.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use catscope_capture::{CaptureConfig, CaptureDelegate, CatscopeError, ChannelSubscriber, Message};

/// How long to wait for something that should happen
pub const WAIT: Duration = Duration::from_secs(5);

/// How long to wait for something that should not happen
pub const QUIET: Duration = Duration::from_millis(300);

/// Timestamp in 2100; always after any registration
pub const FUTURE_SECS: i64 = 4_102_444_800;

/// Timestamp in 2001; always before any registration
pub const PAST_SECS: i64 = 1_000_000_000;

/// A threadtime,epoch line that will never be discarded as backlog
pub fn future_line(priority: &str, tag: &str, body: &str) -> String {
    format!("{FUTURE_SECS}.000  1234  5678 {priority} {tag}: {body}")
}

/// A threadtime,epoch line `offset_secs` after [`FUTURE_SECS`]
pub fn future_line_at(offset_secs: i64, priority: &str, tag: &str, body: &str) -> String {
    let secs = FUTURE_SECS + offset_secs;
    format!("{secs}.000  1234  5678 {priority} {tag}: {body}")
}

/// A threadtime,epoch line older than any registration
pub fn past_line(priority: &str, tag: &str, body: &str) -> String {
    format!("{PAST_SECS}.000  1234  5678 {priority} {tag}: {body}")
}

/// Shell script that prints `lines` and then blocks until killed
pub fn print_then_block(lines: &[String]) -> String {
    let mut script = print_lines(lines);
    script.push_str("exec sleep 30\n");
    script
}

/// Shell script that prints `lines` and exits with `code`
pub fn print_then_exit(lines: &[String], code: i32) -> String {
    let mut script = print_lines(lines);
    script.push_str(&format!("exit {code}\n"));
    script
}

fn print_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("echo '{line}'\n"))
        .collect()
}

/// A fake capture script on disk
pub struct FakeLogcat {
    dir: TempDir,
    path: PathBuf,
}

impl FakeLogcat {
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logcat.sh");
        std::fs::write(&path, script).unwrap();
        Self { dir, path }
    }

    /// Config running the script with extra capture arguments
    pub fn config(&self, extra_args: &str) -> CaptureConfig {
        CaptureConfig {
            program: "sh".to_string(),
            arguments: format!("{} {}", self.path.display(), extra_args),
        }
    }
}

/// A delegate wired to channels, plus the runtime its worker runs on
///
/// Field order matters: the delegate is dropped before the runtime.
pub struct Harness {
    pub delegate: CaptureDelegate,
    pub messages: mpsc::UnboundedReceiver<Message>,
    pub errors: mpsc::UnboundedReceiver<CatscopeError>,
    pub runtime: Runtime,
    pub logcat: FakeLogcat,
}

impl Harness {
    pub fn new(script: &str) -> Self {
        Self::with_args(script, "")
    }

    pub fn with_args(script: &str, extra_args: &str) -> Self {
        let logcat = FakeLogcat::new(script);
        Self::with_config(logcat.config(extra_args), logcat)
    }

    pub fn with_config(config: CaptureConfig, logcat: FakeLogcat) -> Self {
        let runtime = Runtime::new().unwrap();
        let (msg_tx, messages) = mpsc::unbounded_channel();
        let (err_tx, errors) = mpsc::unbounded_channel();
        let subscriber = ChannelSubscriber::new(msg_tx).with_errors(err_tx);
        let delegate = CaptureDelegate::with_config(runtime.handle().clone(), config, subscriber);

        Self {
            delegate,
            messages,
            errors,
            runtime,
            logcat,
        }
    }

    /// Next delivered message, or `None` after `wait`
    pub fn next_message_within(&mut self, wait: Duration) -> Option<Message> {
        let messages = &mut self.messages;
        self.runtime
            .block_on(async move { tokio::time::timeout(wait, messages.recv()).await.ok().flatten() })
    }

    pub fn next_message(&mut self) -> Message {
        self.next_message_within(WAIT)
            .expect("expected a message to be delivered")
    }

    pub fn next_error_within(&mut self, wait: Duration) -> Option<CatscopeError> {
        let errors = &mut self.errors;
        self.runtime
            .block_on(async move { tokio::time::timeout(wait, errors.recv()).await.ok().flatten() })
    }

    pub fn next_error(&mut self) -> CatscopeError {
        self.next_error_within(WAIT)
            .expect("expected an error to be reported")
    }

    /// Poll until the delegate reports itself idle
    pub fn wait_until_idle(&self) -> bool {
        wait_for(|| !self.delegate.is_registered())
    }
}

/// Poll `condition` every 10ms until it holds or [`WAIT`] elapses
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
