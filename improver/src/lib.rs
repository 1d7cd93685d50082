//! Interactive, collaborator-driven code improvement loop.
//!
//! An operator supplies an idea. The crate refines it into a structured
//! prompt, then repeatedly asks a code-editing collaborator to apply that
//! prompt, runs the target program and has a second collaborator judge the
//! outcome, until an evaluation succeeds or the iteration budget runs out.
//! A final automated review and a human confirmation gate acceptance.
//!
//! - **[`core`]**: Pure logic (request templates, response parsing, prompt
//!   rendering, verdict types). No I/O.
//! - **[`io`]**: Side effects (config loading, process supervision, the
//!   collaborator adapter, the operator console, artifacts).
//!
//! Orchestration modules ([`synthesize`], [`execute`], [`evaluate`],
//! [`review`], [`session`]) combine the two.

pub mod core;
pub mod evaluate;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod review;
pub mod session;
pub mod synthesize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
