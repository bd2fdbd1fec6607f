//! Parsers for human readable values in command line arguments, config files and CLI output.

pub mod block_size;
pub mod duration;
