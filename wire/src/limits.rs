//! Configurable bounds for message decoding and info strings.

use crate::protocol::{MAX_INFO_STRING, MAX_KV_LEN, MAX_STRING_LEN, MAX_STRING_LINE_LEN};

/// Wire-level limits.
///
/// Every length here counts the terminating NUL, so the longest accepted
/// payload is one byte shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Buffer size for NUL-terminated strings.
    pub max_string_len: usize,

    /// Buffer size for newline-terminated strings.
    pub max_string_line_len: usize,

    /// Maximum size of an info string.
    pub max_info_string: usize,

    /// Keys and values must be shorter than this.
    pub max_kv_len: usize,

    /// Maximum number of tokens kept from a command line.
    pub max_args: usize,

    /// Tokens longer than this are split.
    pub max_token_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_string_len: MAX_STRING_LEN,
            max_string_line_len: MAX_STRING_LINE_LEN,
            max_info_string: MAX_INFO_STRING,
            max_kv_len: MAX_KV_LEN,
            max_args: 80,
            max_token_len: 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_string_len: 64,
            max_string_line_len: 32,
            max_info_string: 64,
            max_kv_len: 16,
            max_args: 8,
            max_token_len: 32,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_string_len: usize::MAX,
            max_string_line_len: usize::MAX,
            max_info_string: usize::MAX,
            max_kv_len: usize::MAX,
            max_args: usize::MAX,
            max_token_len: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_protocol() {
        let limits = Limits::default();
        assert_eq!(limits.max_string_len, 8192);
        assert_eq!(limits.max_string_line_len, 2048);
        assert_eq!(limits.max_info_string, 256);
        assert_eq!(limits.max_kv_len, 128);
    }

    #[test]
    fn testing_limits_smaller() {
        let test_limits = Limits::for_testing();
        let default_limits = Limits::default();

        assert!(test_limits.max_string_len < default_limits.max_string_len);
        assert!(test_limits.max_info_string < default_limits.max_info_string);
        assert!(test_limits.max_kv_len < default_limits.max_kv_len);
    }

    #[test]
    fn unlimited_limits() {
        let limits = Limits::unlimited();
        assert_eq!(limits.max_string_len, usize::MAX);
        assert_eq!(limits.max_args, usize::MAX);
    }

    #[test]
    fn limits_const_constructible() {
        const LIMITS: Limits = Limits::for_testing();
        assert_eq!(LIMITS.max_kv_len, 16);
    }
}
