// ABOUTME: Drives one command channel from submission to close.
// ABOUTME: A single read loop serves both completion disciplines via different stop rules.

use super::options::{Completion, RunOptions};
use super::text::{OutputDecoder, split_lines};
use crate::ssh::{Error, Result};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;

/// Exit code reported when a command is still running at its deadline.
pub const TIMEOUT_EXIT_CODE: u32 = 1;

/// Exit code reported when the caller interrupts a wait for exit.
pub const INTERRUPTED_EXIT_CODE: u32 = 0;

/// A channel on which a command has already been submitted.
#[async_trait]
pub trait ExecChannel: Send {
    /// Read at most `max` bytes of output. An empty buffer means EOF.
    ///
    /// Must be cancel-safe: dropping the future loses no data.
    async fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Wait for the exit status. `None` if the channel ended without one.
    async fn wait_exit(&mut self) -> Result<Option<u32>>;

    /// Exit status if it has already been received.
    fn exit_status(&self) -> Option<u32>;

    async fn close(&mut self) -> Result<()>;
}

/// Which path ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The remote side reached EOF, or exited.
    Completed,
    /// No EOF before the deadline.
    TimedOut,
    /// The caller aborted a wait for exit. Not a failure.
    Interrupted,
    /// The cancel signal was set.
    Cancelled,
}

/// Result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: u32,
    /// Captured output split into lines. Empty when capture was off.
    pub lines: Vec<String>,
    pub outcome: Outcome,
    /// Whether the remote side reported an exit status.
    pub exited: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Drive `channel` to completion under `options`, then close it.
///
/// The channel is closed exactly once, whatever path ends the run, including
/// errors. Display output goes to `sink`.
pub async fn run_on<C, W>(mut channel: C, options: &RunOptions, sink: &mut W) -> Result<RunOutput>
where
    C: ExecChannel,
    W: Write + Send + ?Sized,
{
    let mut collector = Collector::new(options, sink);
    let stopped = drive(&mut channel, options, &mut collector).await;

    if let Err(e) = channel.close().await {
        tracing::debug!("error closing command channel: {}", e);
    }

    let stop = stopped?;
    let lines = collector.finish()?;

    let (exit_code, exited, outcome) = match stop {
        Stop::Exited(code) => (code, true, Outcome::Completed),
        Stop::TimedOut => (TIMEOUT_EXIT_CODE, false, Outcome::TimedOut),
        Stop::Interrupted => (INTERRUPTED_EXIT_CODE, false, Outcome::Interrupted),
        // Whatever status arrived before close; a cancelled command usually has none.
        Stop::Eof | Stop::Cancelled => {
            let status = channel.exit_status();
            let outcome = if matches!(stop, Stop::Eof) {
                Outcome::Completed
            } else {
                Outcome::Cancelled
            };
            (status.unwrap_or(0), status.is_some(), outcome)
        }
    };

    Ok(RunOutput {
        exit_code,
        lines,
        outcome,
        exited,
    })
}

/// Why the loop stopped, before exit-status bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Exited(u32),
    Eof,
    TimedOut,
    Interrupted,
    Cancelled,
}

/// One turn of the read loop.
enum Step {
    Data(Vec<u8>),
    Eof,
    Deadline,
    Interrupted,
    Cancelled,
}

async fn drive<C, W>(
    channel: &mut C,
    options: &RunOptions,
    collector: &mut Collector<'_, W>,
) -> Result<Stop>
where
    C: ExecChannel,
    W: Write + Send + ?Sized,
{
    let deadline = read_deadline(options);

    if options.discards_output() {
        return wait_without_reading(channel, options, deadline).await;
    }

    loop {
        let step = tokio::select! {
            stop = external_stop(options) => stop,
            step = read_step(channel, options.chunk_size, deadline) => step?,
        };

        let stop = match step {
            Step::Data(bytes) => {
                collector.accept(&bytes)?;
                stop_after_chunk(&options.completion)
            }
            Step::Eof => Some(Stop::Eof),
            Step::Deadline => stop_on_deadline(&options.completion, deadline),
            Step::Interrupted => {
                tracing::info!("command interrupted");
                Some(Stop::Interrupted)
            }
            Step::Cancelled => Some(Stop::Cancelled),
        };

        if let Some(stop) = stop {
            return match stop {
                Stop::Eof => finish_after_eof(channel, options, deadline).await,
                other => Ok(other),
            };
        }
    }
}

/// Per-read deadline: the caller's timeout, or the poll interval when cancellable.
fn read_deadline(options: &RunOptions) -> Option<Duration> {
    match &options.completion {
        Completion::Exit { timeout } => *timeout,
        Completion::Cancel(_) => Some(options.poll_interval),
    }
}

fn stop_after_chunk(completion: &Completion) -> Option<Stop> {
    match completion {
        Completion::Exit { .. } => None,
        Completion::Cancel(signal) => signal.is_set().then_some(Stop::Cancelled),
    }
}

fn stop_on_deadline(completion: &Completion, deadline: Option<Duration>) -> Option<Stop> {
    match completion {
        Completion::Exit { .. } => {
            tracing::warn!("Timeout after {:?}", deadline.unwrap_or_default());
            Some(Stop::TimedOut)
        }
        // Keep polling until the signal flips.
        Completion::Cancel(signal) => signal.is_set().then_some(Stop::Cancelled),
    }
}

/// Resolves when the caller stops the run from outside the loop.
async fn external_stop(options: &RunOptions) -> Step {
    match &options.completion {
        Completion::Exit { .. } => {
            options.interrupt.wait().await;
            Step::Interrupted
        }
        Completion::Cancel(signal) => {
            signal.cancelled().await;
            Step::Cancelled
        }
    }
}

async fn read_step<C: ExecChannel>(
    channel: &mut C,
    max: usize,
    deadline: Option<Duration>,
) -> Result<Step> {
    let read = match deadline {
        Some(limit) => match tokio::time::timeout(limit, channel.read(max)).await {
            Ok(read) => read?,
            Err(_) => return Ok(Step::Deadline),
        },
        None => channel.read(max).await?,
    };

    Ok(if read.is_empty() {
        Step::Eof
    } else {
        Step::Data(read)
    })
}

/// Neither display nor capture: output is drained and dropped undecoded.
async fn wait_without_reading<C: ExecChannel>(
    channel: &mut C,
    options: &RunOptions,
    deadline: Option<Duration>,
) -> Result<Stop> {
    match &options.completion {
        Completion::Cancel(signal) => {
            // Unread data would back up into the shared connection.
            let drained = tokio::select! {
                _ = signal.cancelled() => return Ok(Stop::Cancelled),
                drained = drain_until_eof(channel, options.chunk_size) => drained,
            };
            drained?;
            finish_after_eof(channel, options, deadline).await
        }
        Completion::Exit { .. } => {
            tokio::select! {
                _ = options.interrupt.wait() => {
                    tracing::info!("command interrupted");
                    Ok(Stop::Interrupted)
                }
                status = wait_exit_within(channel, deadline) => match status? {
                    Some(code) => Ok(Stop::Exited(code)),
                    None => {
                        tracing::warn!("Timeout after {:?}", deadline.unwrap_or_default());
                        Ok(Stop::TimedOut)
                    }
                },
            }
        }
    }
}

/// Read and drop output until EOF.
async fn drain_until_eof<C: ExecChannel>(channel: &mut C, max: usize) -> Result<()> {
    while !channel.read(max).await?.is_empty() {}
    Ok(())
}

/// After EOF: fetch the real status when waiting for exit, or take a bounded
/// look for one when cancellable.
async fn finish_after_eof<C: ExecChannel>(
    channel: &mut C,
    options: &RunOptions,
    deadline: Option<Duration>,
) -> Result<Stop> {
    match &options.completion {
        Completion::Exit { .. } => match wait_exit_within(channel, deadline).await? {
            Some(code) => Ok(Stop::Exited(code)),
            None => Ok(Stop::TimedOut),
        },
        Completion::Cancel(_) => {
            if channel.exit_status().is_none() {
                let waited = tokio::time::timeout(options.poll_interval, channel.wait_exit()).await;
                if let Ok(Err(e)) = waited {
                    tracing::debug!("no exit status after EOF: {}", e);
                }
            }
            Ok(Stop::Eof)
        }
    }
}

/// `Ok(None)` when the deadline passes first; `ChannelClosed` when the channel
/// ends without ever reporting a status.
async fn wait_exit_within<C: ExecChannel>(
    channel: &mut C,
    deadline: Option<Duration>,
) -> Result<Option<u32>> {
    let status = match deadline {
        Some(limit) => match tokio::time::timeout(limit, channel.wait_exit()).await {
            Ok(status) => status?,
            Err(_) => return Ok(None),
        },
        None => channel.wait_exit().await?,
    };
    status.map(Some).ok_or(Error::ChannelClosed)
}

/// Applies display and capture to decoded output.
struct Collector<'a, W: ?Sized> {
    decoder: OutputDecoder,
    text: String,
    display: bool,
    capture: bool,
    sink: &'a mut W,
}

impl<'a, W: Write + ?Sized> Collector<'a, W> {
    fn new(options: &RunOptions, sink: &'a mut W) -> Self {
        Self {
            decoder: OutputDecoder::new(),
            text: String::new(),
            display: options.display,
            capture: options.capture_output,
            sink,
        }
    }

    fn accept(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded = self.decoder.push(bytes);
        self.emit(&decoded)
    }

    fn emit(&mut self, decoded: &str) -> Result<()> {
        if decoded.is_empty() {
            return Ok(());
        }
        if self.display {
            self.sink.write_all(decoded.as_bytes())?;
            self.sink.flush()?;
        }
        if self.capture {
            self.text.push_str(decoded);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<String>> {
        let tail = self.decoder.finish();
        self.emit(&tail)?;
        if self.capture {
            Ok(split_lines(&self.text))
        } else {
            Ok(Vec::new())
        }
    }
}
