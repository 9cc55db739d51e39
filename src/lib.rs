// ABOUTME: Library root for sshctl - remote command execution and file access over SSH.
// ABOUTME: The sshctl binary is in main.rs.

pub mod config;
pub mod error;
pub mod exec;
pub mod output;
pub mod ssh;
