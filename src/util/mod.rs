//! Shared utilities (hex formatting).

pub mod hex;
