//! Argument parsing and command dispatch for the `qadoc-fill` binary.

pub mod cli;
