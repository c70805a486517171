// src/cli.rs

//! A thin scanner over `env::args`: object, verb, and `--flag[=value]`
//! options. Full argument parsing lives outside the core; this recognises
//! just enough to dispatch the documented operations.

use crate::core::errors::{UxMgrError, UxMgrResult};
use std::path::PathBuf;

/// Default configuration path when neither `-f` nor `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/uxmgr/uxmgr.toml";

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config: PathBuf,
    pub object: String,
    pub verb: String,
    flags: Vec<(String, Option<String>)>,
}

impl CliArgs {
    /// Parses the argument vector (without the program name).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> UxMgrResult<Self> {
        let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
        let mut positional: Vec<String> = Vec::new();
        let mut flags: Vec<(String, Option<String>)> = Vec::new();

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "-f" || arg == "--config" {
                let Some(path) = iter.next() else {
                    return Err(UxMgrError::Config(format!("{arg} requires a path")));
                };
                config = PathBuf::from(path);
            } else if let Some(rest) = arg.strip_prefix("--") {
                match rest.split_once('=') {
                    Some((name, value)) => {
                        flags.push((name.to_string(), Some(value.to_string())));
                    }
                    None => flags.push((rest.to_string(), None)),
                }
            } else {
                positional.push(arg);
            }
        }

        if positional.len() < 2 {
            return Err(UxMgrError::Config(
                "usage: uxmgr [-f config] <object> <verb> [--flag[=value] ...]".to_string(),
            ));
        }
        let mut positional = positional.into_iter();
        Ok(CliArgs {
            config,
            object: positional.next().unwrap_or_default(),
            verb: positional.next().unwrap_or_default(),
            flags,
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.flags.iter().any(|(n, _)| n == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Valued flag parsed into a type, with a configuration error naming
    /// the flag on failure.
    pub fn value_parsed<T: std::str::FromStr>(&self, name: &str) -> UxMgrResult<Option<T>> {
        match self.value(name) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                UxMgrError::Config(format!("invalid value \"{raw}\" for --{name}"))
            }),
        }
    }
}
