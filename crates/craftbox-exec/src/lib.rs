//! Executor contract and transport plumbing for Craftbox build environments.
//!
//! This crate defines the `Executor` trait every environment backend (VM,
//! container, bare host) must satisfy: file creation, blocking and streaming
//! command execution, recursive directory synchronization, and path
//! predicates. It also carries the tar-pipe sync engine, the bounded
//! readiness pollers, environment bring-up actions, and a scripted
//! `FakeExecutor` for tests.

pub mod actions;
pub mod executor;
pub mod fake;
pub mod ready;
pub mod sync;

pub use executor::{
    argv, env_wrapped, run_command, spawn_streaming, ExecOptions, ExecOutput, Executor,
    FileOwnership,
};
pub use fake::FakeExecutor;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command {command:?} exited with status {exit_code}")]
    CommandFailed { exit_code: i32, command: Vec<String> },
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
