//! Side-effecting operations: configuration, processes, the collaborator
//! agent, the operator console and persisted artifacts.

pub mod artifact;
pub mod collaborator;
pub mod config;
pub mod console;
pub mod process;
