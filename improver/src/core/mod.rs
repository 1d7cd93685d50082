//! Deterministic, pure logic shared by the improvement loop.
//!
//! Core modules must be free of I/O side effects. They turn collaborator text
//! into typed values and render the requests sent back to it.

pub mod prompt;
pub mod response;
pub mod structured;
pub mod types;
pub mod verdict;
