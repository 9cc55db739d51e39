// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the target, connection flags, and all subcommands.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sshctl")]
#[command(about = "Run commands and transfer files on a remote host over SSH")]
#[command(version)]
#[command(
    after_help = "Secrets are read from SSHCTL_PASSWORD and SSHCTL_KEY_PASSPHRASE, never from arguments."
)]
pub struct Cli {
    /// Remote target as [user@]host[:port]
    pub target: String,

    /// Private key file to authenticate with
    #[arg(short = 'i', long, global = true)]
    pub key: Option<PathBuf>,

    /// Key family of --key or of the default key (rsa, dsa, ecdsa, ed25519)
    #[arg(long = "key-type", default_value = "rsa", global = true)]
    pub key_type: String,

    /// Verify the host key against ~/.ssh/known_hosts, recording unknown hosts
    #[arg(long, global = true)]
    pub known_hosts: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command and exit with its exit code
    Run(RunArgs),

    /// Check whether a remote path exists
    Exists {
        path: String,
    },

    /// List a remote directory
    Ls {
        path: String,

        /// Only directories
        #[arg(long, conflicts_with = "files")]
        dirs: bool,

        /// Only regular files
        #[arg(long)]
        files: bool,
    },

    /// Download a remote file
    Get {
        remote: String,
        local: PathBuf,
    },

    /// Upload a local file
    Put {
        local: PathBuf,
        remote: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Command line executed by the remote shell
    pub command: String,

    /// Stream output as it arrives (default unless --capture is given)
    #[arg(long)]
    pub display: bool,

    /// Collect output and print it when the command finishes
    #[arg(long)]
    pub capture: bool,

    /// Merge stderr into the output
    #[arg(long)]
    pub combine_stderr: bool,

    /// Do not allocate a pseudo-terminal
    #[arg(long)]
    pub no_pty: bool,

    /// Seconds to wait for output before giving up; 0 waits forever
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Stream until Ctrl-C instead of waiting for the command to exit
    #[arg(long, conflicts_with = "timeout")]
    pub follow: bool,
}
