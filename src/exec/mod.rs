// ABOUTME: Remote command execution engine.
// ABOUTME: Streams, captures and bounds command output over a per-command channel.

mod engine;
mod options;
mod signal;
mod text;

pub use engine::{
    ExecChannel, INTERRUPTED_EXIT_CODE, Outcome, RunOutput, TIMEOUT_EXIT_CODE, run_on,
};
pub use options::{
    CANCEL_POLL_INTERVAL, Completion, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT, Interrupt, RunOptions,
};
pub use signal::CancelSignal;
pub use text::{OutputDecoder, split_lines};
