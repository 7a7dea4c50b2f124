//! Command line interface module
//!
//! This module provides argument parsing and the runner that connects the
//! configured input and output to the squashing engine.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
