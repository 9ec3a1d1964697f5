//! Command line interface definition.

use clap::Parser;
use std::path::PathBuf;

use catscope_capture::Priority;

/// catscope - capture, filter and print logcat output
#[derive(Parser, Debug)]
#[command(name = "catscope")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Arguments passed to the capture program (default "-b all").
    /// Output format options (-v, --format) are not allowed.
    #[arg(long = "args", value_name = "ARGS", allow_hyphen_values = true)]
    pub capture_args: Option<String>,

    /// Capture program (default "logcat")
    #[arg(long, value_name = "PATH")]
    pub program: Option<String>,

    /// Keep messages whose tag matches REGEX (whole tag)
    #[arg(long, value_name = "REGEX")]
    pub tag: Vec<String>,

    /// Drop messages whose tag matches REGEX (whole tag)
    #[arg(long, value_name = "REGEX")]
    pub exclude_tag: Vec<String>,

    /// Keep messages whose body matches REGEX (whole body)
    #[arg(long, value_name = "REGEX")]
    pub body: Vec<String>,

    /// Keep messages whose formatted line matches REGEX (whole line)
    #[arg(long, value_name = "REGEX")]
    pub grep: Vec<String>,

    /// Keep only these priority letters, e.g. "IWE"
    #[arg(long, value_name = "LETTERS")]
    pub priority: Option<String>,

    /// Keep this priority and above (letter or name)
    #[arg(long, value_name = "PRIORITY")]
    pub min_priority: Option<Priority>,

    /// Output template (default "%de %p %r %vc %t: %m")
    #[arg(long, value_name = "TEMPLATE")]
    pub format: Option<String>,

    /// strftime layout used for %d
    #[arg(long, value_name = "LAYOUT")]
    pub date_format: Option<String>,

    /// Print one JSON object per message instead of a template
    #[arg(long)]
    pub json: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors on stderr
    #[arg(short, long)]
    pub quiet: bool,
}
