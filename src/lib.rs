//! Execution core of `msh`, a small interactive job-control shell.
//!
//! The binary reads lines, [`parse_sequence`] turns them into pipelines, and a
//! [`Session`] runs each one: redirections are resolved up front, commands are
//! connected with OS pipes and launched left to right, and the foreground set
//! is waited on while the [`SignalBridge`] forwards Ctrl-C and Ctrl-Z to it.

#[cfg(not(unix))]
compile_error!("msh needs a Unix process model (fork/exec, waitpid, signals)");

pub mod builtins;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod job_control;
pub mod jobs;
pub mod launcher;
pub mod parser;
pub mod pipes;
pub mod redirect;
pub mod signals;
pub mod status;

pub use config::{Limits, ShellConfig};
pub use error::{ParseError, ShellError, ValidationError};
pub use executor::{Flow, Session};
pub use parser::parse_sequence;
pub use signals::SignalBridge;
