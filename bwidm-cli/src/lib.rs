//! Shared pieces of the bwIDM REST SSH command-line tools.

pub mod exit_codes;
