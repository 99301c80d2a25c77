//! Command parsing for inbound control messages.
//!
//! A command line is split on whitespace. The first token is the command
//! name; each later token is either a named argument (`key=value`, split at
//! the first `=`) or a positional argument keyed by its position among the
//! positional tokens (`"0"`, `"1"`, ...). Only tokens whose name is made of
//! ASCII letters, digits, `-` or `_` count as named; anything else, such as
//! `=value` or a URL with a query string, is kept as a positional value.

use std::collections::HashMap;

/// A parsed control command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    command: String,
    args: HashMap<String, String>,
    raw: String,
}

impl Request {
    /// Parses a raw command line.
    ///
    /// Blank input yields a request with an empty command; the router
    /// rejects it as unknown rather than failing here.
    pub fn parse(raw: &str) -> Self {
        let mut tokens = raw.split_whitespace();
        let command = tokens.next().unwrap_or_default().to_owned();
        let mut args = HashMap::new();
        let mut position = 0_usize;
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) if is_argument_name(key) => {
                    args.insert(key.to_owned(), value.to_owned());
                }
                _ => {
                    args.insert(position.to_string(), token.to_owned());
                    position += 1;
                }
            }
        }
        Self {
            command,
            args,
            raw: raw.to_owned(),
        }
    }

    /// Returns a copy of this request addressed to `command`.
    ///
    /// Arguments and raw text are carried over unchanged so mounted routers
    /// see exactly what the client sent.
    #[must_use]
    pub fn with_command(&self, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: self.args.clone(),
            raw: self.raw.clone(),
        }
    }

    /// The command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The command line as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All parsed arguments.
    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    /// Looks up an argument by name or positional index string.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Looks up a positional argument.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.arg(&index.to_string())
    }

    /// Returns the named argument, falling back to a positional one.
    pub fn named_or_positional(&self, name: &str, index: usize) -> Option<&str> {
        self.arg(name).or_else(|| self.positional(index))
    }
}

fn is_argument_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
}
