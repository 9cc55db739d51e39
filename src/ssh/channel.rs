// ABOUTME: Command channel backed by a russh session channel.
// ABOUTME: Buffers incoming data so reads can be bounded to a chunk size.

use super::client::SshHandler;
use super::error::{Error, Result};
use crate::exec::{ExecChannel, RunOptions};
use async_trait::async_trait;
use bytes::BytesMut;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};

const PTY_TERM: &str = "vt100";
const PTY_COLUMNS: u32 = 80;
const PTY_ROWS: u32 = 24;

/// Extended data stream number for stderr.
const STDERR_STREAM: u32 = 1;

pub(crate) struct SessionChannel {
    channel: Channel<Msg>,
    pending: BytesMut,
    combine_stderr: bool,
    exit_status: Option<u32>,
    /// Remote sent EOF; no more output will arrive.
    eof: bool,
    /// Channel closed; no more messages of any kind.
    finished: bool,
}

impl SessionChannel {
    /// Open a channel and submit `command` on it.
    ///
    /// If setup fails after the channel is open, the channel is closed before
    /// the error is returned.
    pub(crate) async fn open(
        handle: &Handle<SshHandler>,
        command: &str,
        options: &RunOptions,
    ) -> Result<Self> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::ChannelOpen(e.to_string()))?;
        tracing::debug!("opened command channel {:?}", channel.id());

        let mut this = Self {
            channel,
            pending: BytesMut::new(),
            combine_stderr: options.combine_stderr,
            exit_status: None,
            eof: false,
            finished: false,
        };

        if let Err(e) = this.submit(command, options.use_shell).await {
            if let Err(close_err) = this.close().await {
                tracing::debug!("error closing failed channel: {}", close_err);
            }
            return Err(e);
        }
        Ok(this)
    }

    async fn submit(&mut self, command: &str, use_shell: bool) -> Result<()> {
        if use_shell {
            self.channel
                .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
                .await
                .map_err(|e| Error::ChannelOpen(format!("failed to request pty: {}", e)))?;
        }
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| Error::ChannelOpen(format!("failed to exec command: {}", e)))?;
        Ok(())
    }

    /// Record one channel message. Returns output bytes carried by it, if any.
    fn absorb(&mut self, msg: Option<ChannelMsg>) -> Option<Vec<u8>> {
        match msg {
            Some(ChannelMsg::Data { data }) => return Some(data.to_vec()),
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == STDERR_STREAM && self.combine_stderr {
                    return Some(data.to_vec());
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                self.exit_status = Some(exit_status);
            }
            Some(ChannelMsg::Eof) => {
                self.eof = true;
            }
            Some(ChannelMsg::Close) | None => {
                self.eof = true;
                self.finished = true;
            }
            Some(_) => {}
        }
        None
    }
}

#[async_trait]
impl ExecChannel for SessionChannel {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        loop {
            if !self.pending.is_empty() {
                let n = max.max(1).min(self.pending.len());
                return Ok(self.pending.split_to(n).to_vec());
            }
            if self.eof {
                return Ok(Vec::new());
            }
            let msg = self.channel.wait().await;
            if let Some(data) = self.absorb(msg) {
                self.pending.extend_from_slice(&data);
            }
        }
    }

    async fn wait_exit(&mut self) -> Result<Option<u32>> {
        loop {
            if let Some(code) = self.exit_status {
                return Ok(Some(code));
            }
            if self.finished {
                return Ok(None);
            }
            // Output nobody asked for is dropped.
            let msg = self.channel.wait().await;
            let _ = self.absorb(msg);
        }
    }

    fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!("closing command channel {:?}", self.channel.id());
        self.channel.close().await?;
        Ok(())
    }
}
