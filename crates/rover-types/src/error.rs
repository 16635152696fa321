//! Unified error-code interface.
//!
//! Every error type that crosses a crate boundary in this workspace
//! implements [`ErrorCode`]: a stable machine-readable code plus a
//! recoverability flag, so callers can decide between retrying and
//! surfacing the failure without string matching.
//!
//! # Example
//!
//! ```
//! use rover_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum DialFailure {
//!     Timeout,
//!     BadAddress,
//! }
//!
//! impl ErrorCode for DialFailure {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Timeout => "DIAL_TIMEOUT",
//!             Self::BadAddress => "DIAL_BAD_ADDRESS",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Timeout)
//!     }
//! }
//!
//! assert!(DialFailure::Timeout.is_recoverable());
//! ```

/// Stable machine-readable error classification.
///
/// Codes are `UPPER_SNAKE_CASE`, prefixed by domain, and never change
/// once published. Recoverable means a retry (or a corrective action by
/// the caller) may succeed; unrecoverable means it will not.
pub trait ErrorCode {
    /// Returns the stable machine-readable code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code follows workspace conventions: non-empty,
/// `UPPER_SNAKE_CASE`, carrying the expected domain prefix.
///
/// # Panics
///
/// Panics with a descriptive message when a convention is violated.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();
    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// [`assert_error_code`] over every variant of an error enum.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
