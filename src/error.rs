//! Grepable error codes shared by every error enum in the crate.

/// Grepable error code and retryable flag.
///
/// The crate itself never retries. `retryable` is a hint for callers deciding
/// what to show the user.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
