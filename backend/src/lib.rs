//! dirstore command-line tools.
//!
//! The binary in `main.rs` stays thin: argument parsing lives in [`cli`],
//! opening the configured backend in [`lifecycle`], and each subcommand in
//! [`commands`].

pub mod cli;
pub mod commands;
pub mod lifecycle;
pub mod logging;
