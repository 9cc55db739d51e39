// ABOUTME: Per-command execution options and the completion discipline.
// ABOUTME: Either wait for exit under a timeout, or run until a cancel signal flips.

use super::signal::CancelSignal;
use std::time::Duration;

/// Default limit for a command waited on until exit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Bytes requested per channel read.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Read deadline while running until cancelled. Bounds how late a cancel is noticed.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How a run decides it is finished.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Wait for the remote process to exit. `None` waits indefinitely.
    Exit { timeout: Option<Duration> },
    /// Stream until the signal is set or the remote side reaches EOF.
    Cancel(CancelSignal),
}

/// What counts as the caller aborting a wait for exit.
#[derive(Debug, Clone, Default)]
pub enum Interrupt {
    /// Ctrl-C delivered to this process. Installs tokio's SIGINT handler for
    /// the rest of the process lifetime, so only binaries should opt in.
    CtrlC,
    /// A caller-owned signal.
    Signal(CancelSignal),
    #[default]
    Never,
}

impl Interrupt {
    pub(crate) async fn wait(&self) {
        match self {
            Interrupt::CtrlC => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::debug!("cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
            Interrupt::Signal(signal) => signal.cancelled().await,
            Interrupt::Never => std::future::pending().await,
        }
    }
}

/// Options for a single remote command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Echo output to the sink as it arrives.
    pub display: bool,
    /// Keep output and return it as lines.
    pub capture_output: bool,
    /// Merge stderr into the output stream.
    pub combine_stderr: bool,
    /// Allocate a pseudo-terminal for the command.
    pub use_shell: bool,
    pub completion: Completion,
    pub chunk_size: usize,
    pub poll_interval: Duration,
    /// Only consulted when waiting for exit.
    pub interrupt: Interrupt,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            display: false,
            capture_output: false,
            combine_stderr: false,
            use_shell: true,
            completion: Completion::Exit {
                timeout: Some(DEFAULT_TIMEOUT),
            },
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: CANCEL_POLL_INTERVAL,
            interrupt: Interrupt::default(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn combine_stderr(mut self, combine: bool) -> Self {
        self.combine_stderr = combine;
        self
    }

    pub fn use_shell(mut self, use_shell: bool) -> Self {
        self.use_shell = use_shell;
        self
    }

    /// Wait for exit for at most `timeout`. A zero duration waits indefinitely.
    ///
    /// Ignored once `until` has been set.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if let Completion::Exit { .. } = self.completion {
            self.completion = Completion::Exit {
                timeout: (!timeout.is_zero()).then_some(timeout),
            };
        }
        self
    }

    /// Wait for exit with no deadline.
    pub fn no_timeout(mut self) -> Self {
        if let Completion::Exit { .. } = self.completion {
            self.completion = Completion::Exit { timeout: None };
        }
        self
    }

    /// Run until `signal` is set. Takes precedence over any timeout.
    pub fn until(mut self, signal: CancelSignal) -> Self {
        self.completion = Completion::Cancel(signal);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Neither displaying nor capturing: no need to read output at all.
    pub(crate) fn discards_output(&self) -> bool {
        !self.display && !self.capture_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = RunOptions::default();
        assert!(!options.display);
        assert!(!options.capture_output);
        assert!(!options.combine_stderr);
        assert!(options.use_shell);
        assert_eq!(options.chunk_size, 1024);
        assert_eq!(options.poll_interval, Duration::from_secs(2));
        assert!(matches!(
            options.completion,
            Completion::Exit { timeout: Some(t) } if t == Duration::from_secs(600)
        ));
    }

    #[test]
    fn library_default_does_not_listen_for_ctrl_c() {
        assert!(matches!(RunOptions::default().interrupt, Interrupt::Never));
    }

    #[test]
    fn zero_timeout_means_indefinite() {
        let options = RunOptions::new().timeout(Duration::ZERO);
        assert!(matches!(options.completion, Completion::Exit { timeout: None }));
    }

    #[test]
    fn cancel_signal_wins_over_timeout() {
        let signal = CancelSignal::new();
        let options = RunOptions::new()
            .until(signal)
            .timeout(Duration::from_secs(5));
        assert!(matches!(options.completion, Completion::Cancel(_)));
    }
}
