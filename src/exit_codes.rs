//! Exit codes for hamlcop
//!
//! These exit codes allow users and CI/CD systems to distinguish between
//! different types of failures.

/// Success - No lints found or all lints were corrected
pub const SUCCESS: i32 = 0;

/// Lints found - One or more uncorrected lints reported
pub const VIOLATIONS_FOUND: i32 = 1;

/// Tool error - Configuration error, file access error, template parse error
/// or analyzer failure
pub const TOOL_ERROR: i32 = 2;

/// Helper functions for consistent exit behavior
pub mod exit {
    use super::TOOL_ERROR;

    /// Exit with tool error code (2)
    pub fn tool_error() -> ! {
        std::process::exit(TOOL_ERROR);
    }
}
