//! Process exit codes. Scripts gate on these; keep them stable.

pub const SUCCESS: i32 = 0;
/// Blocked action, broken chain or checksum drift.
pub const CHECK_FAILED: i32 = 1;
/// Configuration, I/O or database failure.
pub const INTERNAL_ERROR: i32 = 2;
