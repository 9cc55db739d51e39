// ABOUTME: In-memory ExecChannel that replays a script of remote events.
// ABOUTME: Counts close calls and bytes read so tests can check cleanup and draining.

use async_trait::async_trait;
use sshctl::exec::ExecChannel;
use sshctl::ssh::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One thing the remote side does.
#[derive(Debug, Clone)]
pub enum Event {
    Data(Vec<u8>),
    /// Nothing happens for this long.
    Delay(Duration),
    ExitStatus(u32),
    Eof,
    /// The transport fails.
    Fail(String),
    /// The command keeps running and never produces anything again.
    Hang,
}

impl Event {
    pub fn text(s: &str) -> Self {
        Event::Data(s.as_bytes().to_vec())
    }

    pub fn delay_secs(secs: u64) -> Self {
        Event::Delay(Duration::from_secs(secs))
    }
}

pub struct ScriptedChannel {
    events: VecDeque<Event>,
    /// Deadline of the delay at the front of the script, kept across
    /// cancelled reads so a dropped read does not restart the delay.
    delay_until: Option<Instant>,
    exit_status: Option<u32>,
    closes: Arc<AtomicUsize>,
    bytes_read: Arc<AtomicUsize>,
}

impl ScriptedChannel {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
            delay_until: None,
            exit_status: None,
            closes: Arc::new(AtomicUsize::new(0)),
            bytes_read: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `close` calls.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    /// Shared counter of output bytes handed out by `read`.
    pub fn bytes_read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.bytes_read)
    }

    async fn sleep_through_delay(&mut self, delay: Duration) {
        let until = *self.delay_until.get_or_insert_with(|| Instant::now() + delay);
        tokio::time::sleep_until(until).await;
        self.delay_until = None;
        self.events.pop_front();
    }
}

#[async_trait]
impl ExecChannel for ScriptedChannel {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        loop {
            match self.events.front().cloned() {
                Some(Event::Data(mut bytes)) => {
                    if bytes.len() > max {
                        let rest = bytes.split_off(max);
                        self.events[0] = Event::Data(rest);
                    } else {
                        self.events.pop_front();
                    }
                    self.bytes_read.fetch_add(bytes.len(), Ordering::SeqCst);
                    return Ok(bytes);
                }
                Some(Event::Delay(delay)) => self.sleep_through_delay(delay).await,
                Some(Event::ExitStatus(code)) => {
                    self.exit_status = Some(code);
                    self.events.pop_front();
                }
                Some(Event::Eof) | None => return Ok(Vec::new()),
                Some(Event::Fail(reason)) => return Err(transport_failure(reason)),
                Some(Event::Hang) => std::future::pending::<()>().await,
            }
        }
    }

    async fn wait_exit(&mut self) -> Result<Option<u32>> {
        loop {
            if let Some(code) = self.exit_status {
                return Ok(Some(code));
            }
            match self.events.front().cloned() {
                Some(Event::Data(_)) | Some(Event::Eof) => {
                    self.events.pop_front();
                }
                Some(Event::Delay(delay)) => self.sleep_through_delay(delay).await,
                Some(Event::ExitStatus(code)) => {
                    self.exit_status = Some(code);
                    self.events.pop_front();
                }
                Some(Event::Fail(reason)) => return Err(transport_failure(reason)),
                Some(Event::Hang) => std::future::pending::<()>().await,
                None => return Ok(None),
            }
        }
    }

    fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn transport_failure(reason: String) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        reason,
    ))
}

/// Number of times the channel behind `counter` was closed.
pub fn closes(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
