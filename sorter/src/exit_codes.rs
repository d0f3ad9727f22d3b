//! Stable exit codes for sorter CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, unavailable store or other errors.
pub const INVALID: i32 = 1;
/// The requested batch does not exist.
pub const NOT_FOUND: i32 = 2;
