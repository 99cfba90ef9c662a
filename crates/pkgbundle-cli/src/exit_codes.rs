//! Exit codes of the `pkgbundle` binary.
//! Scripts depend on these values.

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1; // Unreadable or malformed input, bad key, bad selector
pub const INVALID_SIGNATURE: i32 = 4; // Missing or non-verifying signature
