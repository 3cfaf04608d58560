//! Command-line interface for the `layer` binary

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
