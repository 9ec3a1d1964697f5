mod cli;
mod config;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use catscope_capture::{CaptureDelegate, ChannelSubscriber, Message, validate_arguments};

use cli::Args;
use config::{Config, Output, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else if args.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let file = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let settings = Settings::resolve(&args, file)?;

    // Fail before spawning anything
    validate_arguments(&settings.capture.arguments).context("Invalid --args")?;

    let (msg_tx, mut messages) = mpsc::unbounded_channel();
    let (err_tx, mut errors) = mpsc::unbounded_channel();
    let delegate = CaptureDelegate::with_config(
        Handle::current(),
        settings.capture,
        ChannelSubscriber::new(msg_tx).with_errors(err_tx),
    );
    for filter in settings.filters {
        delegate.add_filter(filter);
    }

    debug!(?delegate, "starting capture");
    delegate.register();

    let (stopped_tx, mut stopped) = oneshot::channel::<()>();
    let mut stopped_tx = Some(stopped_tx);
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            biased;

            Some(message) = messages.recv() => {
                if !write_message(&mut stdout, &message, &settings.output)? {
                    info!("stdout closed, stopping capture");
                    delegate.deregister_and_wait().await;
                    return Ok(());
                }
            }
            Some(error) = errors.recv() => {
                delegate.deregister_and_wait().await;
                return Err(error).context("Capture failed");
            }
            _ = tokio::signal::ctrl_c(), if stopped_tx.is_some() => {
                info!("interrupted, stopping capture");
                if let Some(tx) = stopped_tx.take() {
                    delegate.deregister_async_with(move || {
                        let _ = tx.send(());
                    });
                }
            }
            _ = &mut stopped => break,
        }
    }

    while let Ok(message) = messages.try_recv() {
        if !write_message(&mut stdout, &message, &settings.output)? {
            break;
        }
    }

    Ok(())
}

/// Print one message; `false` once the reader has gone away
fn write_message(out: &mut impl Write, message: &Message, output: &Output) -> Result<bool> {
    let written = match output {
        Output::Text(format) => writeln!(out, "{}", format.render(message)),
        Output::Json => serde_json::to_writer(&mut *out, message)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out)),
    };

    match written.and_then(|()| out.flush()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(e) => Err(e).context("Failed to write to stdout"),
    }
}
