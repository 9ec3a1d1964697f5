//! Capture delegate: owns the logcat child process and the worker task that
//! reads, parses, filters and delivers its output.
//!
//! Lifecycle: `Idle -> Running -> Stopping -> Idle`. `register` starts a worker
//! on the runtime the delegate was built with; `deregister_async` cancels it
//! (killing the child, which unblocks the pending read) and returns at once;
//! `deregister` does the same and then waits until the worker has exited.

use std::panic::AssertUnwindSafe;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use catscope_types::{CatscopeError, Message, Result};

use crate::chain::{FilterChain, FilterId};
use crate::filter::MessageFilter;
use crate::parser::LineParser;
use crate::subscriber::Subscriber;

/// Capture executable used unless configured otherwise
pub const DEFAULT_PROGRAM: &str = "logcat";

/// Read every log buffer
pub const DEFAULT_ARGUMENTS: &str = "-b all";

/// Appended to every invocation; the parser depends on this line shape
pub const OUTPUT_FORMAT_ARGUMENTS: [&str; 2] = ["-v", "threadtime,epoch"];

/// Pause before restarting a capture process that exited cleanly
pub const RESPAWN_DELAY: Duration = Duration::from_millis(250);

type Completion = Box<dyn FnOnce() + Send + 'static>;
type WorkerDone = Shared<BoxFuture<'static, ()>>;

/// What to run for capture
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Capture executable
    pub program: String,

    /// Whitespace separated arguments; must not select an output format
    pub arguments: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            arguments: DEFAULT_ARGUMENTS.to_string(),
        }
    }
}

impl CaptureConfig {
    /// Full argument vector: the caller's arguments followed by the fixed
    /// output format
    pub fn command_args(&self) -> Result<Vec<String>> {
        let mut args = validate_arguments(&self.arguments)?;
        args.extend(OUTPUT_FORMAT_ARGUMENTS.iter().map(|a| a.to_string()));
        Ok(args)
    }
}

/// Split an argument string, rejecting anything that would override the
/// output format (`-v`, `-v<fmt>`, `--format`, `--format=<fmt>`)
pub fn validate_arguments(arguments: &str) -> Result<Vec<String>> {
    arguments
        .split_whitespace()
        .map(|arg| {
            if is_format_override(arg) {
                Err(CatscopeError::ReservedArgument(arg.to_string()))
            } else {
                Ok(arg.to_string())
            }
        })
        .collect()
}

fn is_format_override(arg: &str) -> bool {
    arg == "--format"
        || arg.starts_with("--format=")
        || (arg.starts_with("-v") && !arg.starts_with("--"))
}

/// Whether a parsed message should reach the subscriber: it must not predate
/// the registration and must pass every filter.
pub fn admits(registered_at: DateTime<Utc>, filters: &FilterChain, message: &Message) -> bool {
    message.logged_at() >= registered_at && filters.accepts(message)
}

/// Registration time truncated to the parser's millisecond resolution, so a
/// message logged in the same millisecond is not discarded
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Newest timestamp read so far, so a respawned process replaying its ring
/// buffer does not deliver the same lines twice
///
/// After a respawn, lines logged at or before the newest timestamp seen from
/// earlier processes are treated as replayed, including lines in that same
/// millisecond.
#[derive(Debug, Default)]
struct Replay {
    newest: Option<DateTime<Utc>>,
    skip_through: Option<DateTime<Utc>>,
}

impl Replay {
    fn is_fresh(&mut self, logged_at: DateTime<Utc>) -> bool {
        if self.skip_through.is_some_and(|seen| logged_at <= seen) {
            return false;
        }
        self.newest = self.newest.max(Some(logged_at));
        true
    }

    fn respawned(&mut self) {
        self.skip_through = self.newest;
    }
}

struct Worker {
    generation: u64,
    cancel: CancellationToken,
    done: WorkerDone,
    on_stopped: Arc<Mutex<Option<Completion>>>,
}

#[derive(Default)]
struct State {
    running: bool,
    generation: u64,
    registered_at: Option<DateTime<Utc>>,
    /// Most recently started worker, kept until replaced so it can be joined
    worker: Option<Worker>,
}

struct Inner {
    config: RwLock<CaptureConfig>,
    filters: RwLock<FilterChain>,
    subscriber: Arc<dyn Subscriber>,
    state: Mutex<State>,
    live_workers: AtomicUsize,
}

/// Everything one worker needs for its registration period
struct Job {
    generation: u64,
    registered_at: DateTime<Utc>,
    cancel: CancellationToken,
    on_stopped: Arc<Mutex<Option<Completion>>>,
    previous: Option<WorkerDone>,
}

/// Captures logcat output and delivers filtered messages to a [`Subscriber`]
///
/// All methods take `&self` and may be called from any thread; wrap the
/// delegate in an `Arc` to share it.
pub struct CaptureDelegate {
    runtime: Handle,
    inner: Arc<Inner>,
}

impl CaptureDelegate {
    /// Create a delegate with the default capture configuration
    ///
    /// The worker runs on `runtime`, never on the caller's thread.
    pub fn new(runtime: Handle, subscriber: impl Subscriber) -> Self {
        Self::with_config(runtime, CaptureConfig::default(), subscriber)
    }

    pub fn with_config(runtime: Handle, config: CaptureConfig, subscriber: impl Subscriber) -> Self {
        Self {
            runtime,
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                filters: RwLock::new(FilterChain::new()),
                subscriber: Arc::new(subscriber),
                state: Mutex::new(State::default()),
                live_workers: AtomicUsize::new(0),
            }),
        }
    }

    /// Replace the capture arguments; takes effect on the next spawn
    pub fn set_arguments(&self, arguments: impl Into<String>) {
        self.inner.config.write().arguments = arguments.into();
    }

    pub fn arguments(&self) -> String {
        self.inner.config.read().arguments.clone()
    }

    pub fn set_program(&self, program: impl Into<String>) {
        self.inner.config.write().program = program.into();
    }

    pub fn config(&self) -> CaptureConfig {
        self.inner.config.read().clone()
    }

    /// Append a filter. Safe while registered; applies from the next line on.
    pub fn add_filter(&self, filter: MessageFilter) -> FilterId {
        self.inner.filters.write().add(filter)
    }

    /// Remove a filter; `None` if it was not present
    pub fn remove_filter(&self, id: FilterId) -> Option<MessageFilter> {
        self.inner.filters.write().remove(id)
    }

    pub fn filter_count(&self) -> usize {
        self.inner.filters.read().len()
    }

    /// Start capturing. Does nothing if already registered.
    ///
    /// Messages logged before this call are discarded even if the capture
    /// process replays them.
    pub fn register(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let registered_at = now_millis();
        let cancel = CancellationToken::new();
        let on_stopped = Arc::new(Mutex::new(None));

        let job = Job {
            generation,
            registered_at,
            cancel: cancel.clone(),
            on_stopped: Arc::clone(&on_stopped),
            // A worker still tearing down must finish before the next one
            // spawns its process.
            previous: state.worker.take().map(|w| w.done),
        };

        let handle = self.runtime.spawn(run_worker(Arc::clone(&self.inner), job));
        let done = handle.map(|_| ()).boxed().shared();

        state.running = true;
        state.registered_at = Some(registered_at);
        state.worker = Some(Worker {
            generation,
            cancel,
            done,
            on_stopped,
        });

        info!(generation, %registered_at, "capture registered");
    }

    /// Stop capturing without waiting
    ///
    /// The child is killed by the worker as soon as it next polls its
    /// cancellation token. While a subscriber hook is running on the worker,
    /// the child stays alive until that hook returns.
    pub fn deregister_async(&self) {
        self.stop_worker(None);
    }

    /// Stop capturing without waiting; `on_complete` runs on the worker once
    /// it has fully torn down
    ///
    /// If the delegate is not registered nothing happens and `on_complete` is
    /// dropped without being called.
    pub fn deregister_async_with<F>(&self, on_complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop_worker(Some(Box::new(on_complete)));
    }

    /// Stop capturing and block until the worker has exited
    ///
    /// Concurrent callers all wait for the same worker. Must not be called
    /// from a subscriber hook or from inside an async context; use
    /// [`deregister_and_wait`](Self::deregister_and_wait) there.
    pub fn deregister(&self) {
        if let Some(done) = self.stop_worker(None) {
            futures::executor::block_on(done);
        }
    }

    /// Async counterpart of [`deregister`](Self::deregister)
    pub async fn deregister_and_wait(&self) {
        if let Some(done) = self.stop_worker(None) {
            done.await;
        }
    }

    pub fn is_registered(&self) -> bool {
        self.inner.state.lock().running
    }

    /// When the current registration started
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        let state = self.inner.state.lock();
        state.registered_at.filter(|_| state.running)
    }

    /// Number of workers currently running a capture loop (0 or 1)
    pub fn active_workers(&self) -> usize {
        self.inner.live_workers.load(Ordering::SeqCst)
    }

    /// Cancel the current worker and return its completion future
    fn stop_worker(&self, on_complete: Option<Completion>) -> Option<WorkerDone> {
        let mut state = self.inner.state.lock();
        let worker = state.worker.as_ref()?;
        let done = worker.done.clone();

        if !state.running {
            return Some(done);
        }

        if let Some(callback) = on_complete {
            *worker.on_stopped.lock() = Some(callback);
        }
        worker.cancel.cancel();
        info!(generation = worker.generation, "capture deregistering");

        state.running = false;
        Some(done)
    }
}

impl Drop for CaptureDelegate {
    fn drop(&mut self) {
        if let Some(worker) = &self.inner.state.lock().worker {
            worker.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for CaptureDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CaptureDelegate")
            .field("config", &*self.inner.config.read())
            .field("running", &state.running)
            .field("generation", &state.generation)
            .field("filters", &self.inner.filters.read().len())
            .finish()
    }
}

impl Inner {
    fn dispatch(&self, registered_at: DateTime<Utc>, replay: &mut Replay, line: &str) {
        let Some(message) = LineParser::parse(line) else {
            trace!(line, "skipping unparsed line");
            return;
        };
        if !replay.is_fresh(message.logged_at()) {
            trace!(line, "skipping replayed line");
            return;
        }

        let accepted = admits(registered_at, &self.filters.read(), &message);
        if accepted {
            self.subscriber.on_new_message(message);
        }
    }
}

async fn run_worker(inner: Arc<Inner>, job: Job) {
    if let Some(previous) = job.previous.clone() {
        previous.await;
    }

    inner.live_workers.fetch_add(1, Ordering::SeqCst);
    let outcome = AssertUnwindSafe(async {
        if let Err(error) = capture(&inner, &job).await {
            warn!(generation = job.generation, %error, "capture failed");
            inner.subscriber.on_exception(error);
        }
    })
    .catch_unwind()
    .await;
    inner.live_workers.fetch_sub(1, Ordering::SeqCst);

    if outcome.is_err() {
        error!(generation = job.generation, "capture worker panicked");
    }

    let completion = {
        let mut state = inner.state.lock();
        if state.generation == job.generation {
            state.running = false;
        }
        job.on_stopped.lock().take()
    };

    debug!(generation = job.generation, "capture worker stopped");

    if let Some(completion) = completion {
        completion();
    }
}

/// Spawn-read-dispatch loop. `Ok` means the loop was cancelled; every other
/// way out is an error.
async fn capture(inner: &Inner, job: &Job) -> Result<()> {
    let mut replay = Replay::default();

    loop {
        if job.cancel.is_cancelled() {
            return Ok(());
        }

        let (program, args) = {
            let config = inner.config.read();
            (config.program.clone(), config.command_args()?)
        };

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CatscopeError::ProcessFault(format!("failed to start {program}: {e}")))?;

        debug!(generation = job.generation, %program, ?args, pid = child.id(), "capture process started");

        let stdout = child.stdout.take().ok_or_else(|| {
            CatscopeError::ProcessFault(format!("{program}: standard output not captured"))
        })?;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = job.cancel.cancelled() => None,
                read = reader.read_until(b'\n', &mut buf) => Some(read),
            };

            match read {
                None => {
                    stop(&mut child).await;
                    return Ok(());
                }
                Some(Ok(0)) => break,
                Some(Ok(_)) => {
                    let line = String::from_utf8_lossy(trim_line_end(&buf));
                    inner.dispatch(job.registered_at, &mut replay, &line);
                }
                Some(Err(e)) => {
                    stop(&mut child).await;
                    if job.cancel.is_cancelled() {
                        return Ok(());
                    }
                    return Err(e.into());
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        let status = match status {
            None => {
                stop(&mut child).await;
                return Ok(());
            }
            Some(status) => status?,
        };

        if job.cancel.is_cancelled() {
            return Ok(());
        }
        if !status.success() {
            return Err(CatscopeError::ProcessFault(format!(
                "{program} exited with {status}"
            )));
        }

        debug!(generation = job.generation, %program, "capture process exited cleanly, restarting");
        replay.respawned();

        tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(RESPAWN_DELAY) => {}
        }
    }
}

async fn stop(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "capture process already gone");
    }
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}
