//! Entity types shared between the orchestration core and its CLI.
//!
//! Mirrors the split this repo has always used: the types a caller needs
//! to build a request or read a record live here, free of the database
//! and transport dependencies that only the core binary needs.

pub mod entities;
pub mod parsers;

pub use anyhow;
pub use serror;
