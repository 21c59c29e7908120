//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; batch scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 60-69   | linkage          | Config, input, and artifact failures     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use linkage_matcher::MatchError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - every requested jurisdiction completed.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
/// Emitted by clap itself.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Linkage (60-69)
// =============================================================================

/// Config file failed to parse or validate.
pub const EXIT_LINKAGE_INVALID_CONFIG: u8 = 60;

/// Input could not be read or violated a structural invariant
/// (missing column, malformed date, duplicate id, bad crosswalk vintage).
pub const EXIT_LINKAGE_RUNTIME: u8 = 61;

/// Requested jurisdiction is not in the configured list.
pub const EXIT_LINKAGE_UNKNOWN_JURISDICTION: u8 = 62;

/// Artifacts could not be written to the output directory.
pub const EXIT_LINKAGE_OUTPUT: u8 = 63;

/// Map an engine error raised while loading or running a jurisdiction.
pub fn linkage_exit_code(err: &MatchError) -> u8 {
    match err {
        MatchError::ConfigParse(_) | MatchError::ConfigValidation(_) => EXIT_LINKAGE_INVALID_CONFIG,
        MatchError::UnknownJurisdiction(_) => EXIT_LINKAGE_UNKNOWN_JURISDICTION,
        _ => EXIT_LINKAGE_RUNTIME,
    }
}
