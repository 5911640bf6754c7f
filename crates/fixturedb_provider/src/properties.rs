//! String key/value configuration maps.
//!
//! Factories and handles are configured through flat [`Properties`] maps.
//! Property files use the familiar `key=value` line format:
//!
//! ```text
//! # comment
//! persistence.url = file:{unit}?mode=memory&cache=shared
//! sqlite.busy-timeout-ms: 2000
//! ```

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::str::FromStr;

/// Handle option selecting the transaction mode. Every provider must honor
/// `local`, the value the fixture manager requests.
pub const TRANSACTION_MODE: &str = "persistence.transaction-mode";

/// An ordered map of configuration keys to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, returning the previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the value for `key` parsed as `T`.
    ///
    /// Returns `None` if the key is absent and `Some(Err)` if it does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<Result<T, T::Err>> {
        self.get(key).map(|v| v.trim().parse())
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every entry of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Properties) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Returns a new map with `overrides` layered on top of `self`.
    #[must_use]
    pub fn merged(&self, overrides: &Properties) -> Properties {
        let mut out = self.clone();
        out.merge(overrides);
        out
    }

    /// Parses `key=value` text.
    ///
    /// Lines starting with `#` or `!` are comments. The key ends at the first
    /// `=`, `:` or whitespace; both sides are trimmed. A trailing backslash
    /// continues the value on the next line. A line with no separator defines
    /// a key with an empty value.
    pub fn parse(text: &str) -> Self {
        let mut props = Properties::new();
        let mut lines = text.lines();

        while let Some(raw) = lines.next() {
            let mut line = raw.trim_start().to_string();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            while line.ends_with('\\') {
                line.pop();
                match lines.next() {
                    Some(next) => line.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_entry(&line);
            props.set(key, value);
        }

        props
    }

    /// Reads and parses properties from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader fails or the content is not UTF-8.
    pub fn load<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self::parse(&text))
    }
}

fn split_entry(line: &str) -> (&str, &str) {
    match line.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) {
        Some(idx) => {
            let key = line[..idx].trim_end();
            let mut rest = line[idx..].trim_start();
            if let Some(stripped) = rest.strip_prefix(['=', ':']) {
                rest = stripped.trim_start();
            }
            (key, rest.trim_end())
        }
        None => (line.trim_end(), ""),
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        props.extend(iter);
        props
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Properties {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}
