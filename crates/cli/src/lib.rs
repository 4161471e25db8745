//! Command-line and HTTP frontend for sessionprobe.

pub mod cli;
pub mod commands;
pub mod logging;
