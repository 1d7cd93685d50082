//! Process exit codes for the `improver` binary.

/// The session reached a terminal status, including aborts and rejections.
pub const OK: i32 = 0;
/// Startup failed (config, prompt file) or the console could not be read.
pub const INVALID: i32 = 1;
