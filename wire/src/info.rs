//! Backslash-delimited `\key\value` info strings.

use std::fmt;
use std::ops::Range;

use crate::error::{WireError, WireResult};
use crate::limits::Limits;

/// An info string such as `\name\player\rate\25000`.
///
/// Lookups are forgiving and accept a missing leading backslash; validation
/// through [`is_valid`](Self::is_valid) is strict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InfoString(String);

struct Pair<'a> {
    span: Range<usize>,
    key: &'a str,
    value: &'a str,
}

fn pairs_with_spans(s: &str) -> Vec<Pair<'_>> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let start = pos;
        if s.as_bytes().get(pos) == Some(&b'\\') {
            pos += 1;
        }
        let Some(key_len) = s[pos..].find('\\') else {
            break;
        };
        let key_end = pos + key_len;
        let value_start = key_end + 1;
        let value_end = s[value_start..]
            .find('\\')
            .map_or(s.len(), |i| value_start + i);
        out.push(Pair {
            span: start..value_end,
            key: &s[pos..key_end],
            value: &s[value_start..value_end],
        });
        if value_end >= s.len() {
            break;
        }
        pos = value_end;
    }
    out
}

impl InfoString {
    /// Wraps existing info text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the raw text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the info string is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(key, value)` pairs in order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        pairs_with_spans(&self.0)
            .into_iter()
            .map(|pair| (pair.key, pair.value))
    }

    /// Returns the value of the first pair whose key matches exactly.
    #[must_use]
    pub fn value_for_key(&self, key: &str) -> Option<&str> {
        self.pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Removes every pair with the given key.
    pub fn remove_key(&mut self, key: &str) {
        if key.contains('\\') {
            return;
        }
        let spans: Vec<Range<usize>> = pairs_with_spans(&self.0)
            .into_iter()
            .filter(|pair| pair.key == key)
            .map(|pair| pair.span)
            .collect();
        for span in spans.into_iter().rev() {
            self.0.replace_range(span, "");
        }
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// An empty value only removes the key. Star keys are refused.
    pub fn set_value_for_key(&mut self, key: &str, value: &str, limits: &Limits) -> WireResult<()> {
        if key.starts_with('*') {
            return Err(WireError::StarKey {
                key: key.to_string(),
            });
        }
        self.set_star_value_for_key(key, value, limits)
    }

    /// Sets `key` to `value`, allowing engine-owned star keys.
    pub fn set_star_value_for_key(
        &mut self,
        key: &str,
        value: &str,
        limits: &Limits,
    ) -> WireResult<()> {
        for ch in ['\\', '"'] {
            if key.contains(ch) || value.contains(ch) {
                return Err(WireError::InvalidInfoChar { ch });
            }
        }
        for len in [key.len(), value.len()] {
            if len >= limits.max_kv_len {
                return Err(WireError::InfoFieldTooLong {
                    len,
                    max: limits.max_kv_len,
                });
            }
        }

        self.remove_key(key);
        if value.is_empty() {
            return Ok(());
        }

        let len = self.0.len() + key.len() + value.len() + 2;
        if len >= limits.max_info_string {
            return Err(WireError::InfoStringFull {
                len,
                max: limits.max_info_string,
            });
        }

        self.0.push('\\');
        self.0.push_str(key);
        self.0.push('\\');
        self.0.push_str(value);
        Ok(())
    }

    /// Returns `true` if the string is a well-formed, non-empty info string.
    ///
    /// Every pair must start with a backslash, keys and values must be
    /// non-empty and shorter than the key/value limit, keys must be unique,
    /// and `"` and `;` are not allowed anywhere.
    #[must_use]
    pub fn is_valid(&self, limits: &Limits) -> bool {
        let b = self.0.as_bytes();
        let mut keys: Vec<&[u8]> = Vec::new();
        let mut i = 0;

        while b.get(i) == Some(&b'\\') {
            i += 1;
            let key_start = i;
            loop {
                match b.get(i) {
                    None | Some(b'"' | b';') => return false,
                    Some(b'\\') => break,
                    Some(_) => i += 1,
                }
            }
            let key = &b[key_start..i];
            if key.is_empty() || key.len() >= limits.max_kv_len || keys.contains(&key) {
                return false;
            }
            keys.push(key);

            i += 1;
            let value_start = i;
            while let Some(&c) = b.get(i) {
                match c {
                    b'\\' => break,
                    b'"' | b';' => return false,
                    _ => i += 1,
                }
            }
            let value_len = i - value_start;
            if value_len == 0 || value_len >= limits.max_kv_len {
                return false;
            }
            if i == b.len() {
                return true;
            }
        }
        false
    }
}

impl fmt::Display for InfoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InfoString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for InfoString {
    fn from(text: String) -> Self {
        Self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_for_key_finds_pairs() {
        let info = InfoString::new("\\name\\Gordon\\rate\\25000");
        assert_eq!(info.value_for_key("name"), Some("Gordon"));
        assert_eq!(info.value_for_key("rate"), Some("25000"));
        assert_eq!(info.value_for_key("Name"), None);
    }

    #[test]
    fn value_for_key_without_leading_backslash() {
        let info = InfoString::new("prot\\2\\raw\\steam");
        assert_eq!(info.value_for_key("prot"), Some("2"));
        assert_eq!(info.value_for_key("raw"), Some("steam"));
    }

    #[test]
    fn trailing_key_without_value_is_ignored() {
        let info = InfoString::new("\\a\\1\\b");
        assert_eq!(info.pairs().count(), 1);
        assert_eq!(info.value_for_key("b"), None);
    }

    #[test]
    fn remove_key_keeps_other_pairs() {
        let mut info = InfoString::new("\\name\\x\\password\\hunter2\\rate\\1");
        info.remove_key("password");
        assert_eq!(info.as_str(), "\\name\\x\\rate\\1");
        info.remove_key("missing");
        assert_eq!(info.as_str(), "\\name\\x\\rate\\1");
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut info = InfoString::new("\\name\\old\\rate\\1");
        info.set_value_for_key("name", "new", &Limits::default())
            .unwrap();
        assert_eq!(info.as_str(), "\\rate\\1\\name\\new");
    }

    #[test]
    fn set_empty_value_removes() {
        let mut info = InfoString::new("\\name\\old");
        info.set_value_for_key("name", "", &Limits::default()).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn set_refuses_star_keys() {
        let mut info = InfoString::default();
        let err = info
            .set_value_for_key("*sid", "1", &Limits::default())
            .unwrap_err();
        assert!(matches!(err, WireError::StarKey { .. }));
        info.set_star_value_for_key("*sid", "1", &Limits::default())
            .unwrap();
        assert_eq!(info.value_for_key("*sid"), Some("1"));
    }

    #[test]
    fn set_refuses_delimiters() {
        let mut info = InfoString::default();
        let err = info
            .set_value_for_key("name", "a\\b", &Limits::default())
            .unwrap_err();
        assert_eq!(err, WireError::InvalidInfoChar { ch: '\\' });
    }

    #[test]
    fn set_refuses_overflow() {
        let limits = Limits::for_testing();
        let mut info = InfoString::new("\\aaaaaaaaaaaaaaa\\bbbbbbbbbbbbbbb\\ccccccccccccccc\\ddddddddddd");
        let err = info.set_value_for_key("key", "value", &limits).unwrap_err();
        assert!(matches!(err, WireError::InfoStringFull { .. }));
    }

    #[test]
    fn valid_userinfo() {
        let limits = Limits::default();
        assert!(InfoString::new("\\name\\player\\model\\gordon").is_valid(&limits));
        assert!(InfoString::new("\\prot\\3\\raw\\steam\\cdkey\\0123").is_valid(&limits));
    }

    #[test]
    fn invalid_userinfo() {
        let limits = Limits::default();
        for text in [
            "",
            "name\\x",
            "\\name",
            "\\name\\",
            "\\\\x",
            "\\name\\a\"b",
            "\\name\\a;b",
            "\\name\\a\\name\\b",
            "\\name\\a\\\\",
        ] {
            assert!(!InfoString::new(text).is_valid(&limits), "{text:?}");
        }
    }

    #[test]
    fn long_fields_are_invalid() {
        let limits = Limits::default();
        let long = "x".repeat(128);
        assert!(!InfoString::new(format!("\\name\\{long}")).is_valid(&limits));
        assert!(InfoString::new(format!("\\name\\{}", &long[..127])).is_valid(&limits));
    }
}
