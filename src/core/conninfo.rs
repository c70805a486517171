// src/core/conninfo.rs

//! Keyword/value connection strings.
//!
//! Connection parameters are kept as an insertion-ordered list so that a
//! parsed string can be reconstructed deterministically, amended (user
//! substitution, replication channel derivation) and handed to the driver
//! unchanged otherwise.

use crate::core::errors::{UxMgrError, UxMgrResult};
use std::fmt;

/// The application name every uxmgr session announces unless the operator's
/// conninfo already carries one.
pub const DEFAULT_APPLICATION_NAME: &str = "uxmgr";

/// An ordered keyword/value connection parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnInfo {
    entries: Vec<(String, String)>,
}

impl ConnInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `keyword=value keyword='quoted value'` string.
    ///
    /// The accepted grammar matches the engine's libpq-style conninfo:
    /// whitespace separates settings, values may be single-quoted, and a
    /// backslash escapes the next character inside or outside quotes.
    pub fn parse(s: &str) -> UxMgrResult<Self> {
        let mut out = ConnInfo::new();
        let mut chars = s.chars().peekable();

        loop {
            // Skip leading whitespace between settings.
            while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            // Keyword runs up to '='; surrounding whitespace is tolerated.
            let mut key = String::new();
            loop {
                match chars.next() {
                    Some('=') => break,
                    Some(c) if c.is_whitespace() => {
                        // Only valid if the '=' follows.
                        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                            chars.next();
                        }
                        match chars.next() {
                            Some('=') => break,
                            _ => {
                                return Err(UxMgrError::ConnInfo(format!(
                                    "missing \"=\" after \"{key}\""
                                )));
                            }
                        }
                    }
                    Some(c) => key.push(c),
                    None => {
                        return Err(UxMgrError::ConnInfo(format!(
                            "missing \"=\" after \"{key}\""
                        )));
                    }
                }
            }
            if key.is_empty() {
                return Err(UxMgrError::ConnInfo("empty keyword".to_string()));
            }

            while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                chars.next();
            }

            let mut value = String::new();
            if chars.peek() == Some(&'\'') {
                chars.next();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(c) => value.push(c),
                            None => {
                                return Err(UxMgrError::ConnInfo(
                                    "unterminated escape in quoted value".to_string(),
                                ));
                            }
                        },
                        Some('\'') => break,
                        Some(c) => value.push(c),
                        None => {
                            return Err(UxMgrError::ConnInfo(
                                "unterminated quoted value".to_string(),
                            ));
                        }
                    }
                }
            } else {
                loop {
                    match chars.peek() {
                        Some('\\') => {
                            chars.next();
                            match chars.next() {
                                Some(c) => value.push(c),
                                None => {
                                    return Err(UxMgrError::ConnInfo(
                                        "unterminated escape".to_string(),
                                    ));
                                }
                            }
                        }
                        Some(c) if !c.is_whitespace() => {
                            value.push(*c);
                            chars.next();
                        }
                        _ => break,
                    }
                }
            }

            out.set(&key, &value);
        }

        Ok(out)
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key` to `value`, replacing in place to preserve the original
    /// position, or appending when the key is new.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    /// Sets `key` only when it is not already present.
    pub fn set_default(&mut self, key: &str, value: &str) {
        if self.get(key).is_none() {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Derives the parameter set for a streaming-replication channel.
    pub fn for_replication(&self, replication_user: &str) -> ConnInfo {
        let mut out = self.clone();
        out.set("user", replication_user);
        out.set("replication", "1");
        out.set("dbname", "replication");
        out
    }

    /// Duplicates the parameter set, optionally substituting the role.
    pub fn with_user(&self, user: Option<&str>) -> ConnInfo {
        let mut out = self.clone();
        if let Some(user) = user {
            out.set("user", user);
        }
        out
    }

    /// Renders a single value with quoting when it contains whitespace,
    /// quotes, backslashes, or is empty.
    fn quote_value(value: &str, out: &mut String) {
        let needs_quotes =
            value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
        if !needs_quotes {
            out.push_str(value);
            return;
        }
        out.push('\'');
        for c in value.chars() {
            if c == '\'' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('\'');
    }
}

impl fmt::Display for ConnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                rendered.push(' ');
            }
            rendered.push_str(k);
            rendered.push('=');
            Self::quote_value(v, &mut rendered);
        }
        f.write_str(&rendered)
    }
}
