//! A configuration source made of `key=value` overrides.

use config::{ConfigError, Source, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// A set of toml lines, usually taken from the command line, that
/// override values from configuration files.
///
/// A line of the form `key=bareword` has its value quoted before parsing,
/// so `-c proxy.ip=localhost` works without extra shell quoting.  So does
/// a line whose value is a dotted-quad address.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// The lines, in the order given.
    lines: Vec<String>,
}

impl Overrides {
    /// Make a new empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single toml line.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Return true if there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Join every line into a single toml document.
    fn to_toml(&self) -> String {
        self.lines
            .iter()
            .map(|l| quote_bareword(l).unwrap_or_else(|| l.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Turn a toml parse error into one that names the offending line.
    fn describe_error(&self, err: &toml::de::Error) -> String {
        static LOCATION: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(.*?) at line [0-9]+ column [0-9]+$").expect("bad built-in regex")
        });
        let text = err.to_string();
        let msg = LOCATION
            .captures(&text)
            .and_then(|c| c.get(1))
            .map_or(text.as_str(), |m| m.as_str());
        match err.line_col().and_then(|(line, _)| self.lines.get(line)) {
            Some(line) => format!("{} in {:?}", msg, line),
            None => format!("{} in configuration overrides", msg),
        }
    }
}

impl Source for Overrides {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<HashMap<String, Value>, ConfigError> {
        let parsed: toml::Value = toml::from_str(&self.to_toml())
            .map_err(|e| ConfigError::Message(self.describe_error(&e)))?;
        parsed
            .try_into()
            .map_err(|e| ConfigError::Foreign(Box::new(e)))
    }
}

/// If `line` looks like `dotted.key=bareword` or `dotted.key=a.b.c.d`,
/// return it with the value quoted.
fn quote_bareword(line: &str) -> Option<String> {
    static BAREWORD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*((?:[A-Za-z0-9_\-]+\.)*[A-Za-z0-9_\-]+)\s*=\s*([A-Za-z_][A-Za-z0-9_\.\-]*|[0-9]+(?:\.[0-9]+){3})\s*$")
            .expect("bad built-in regex")
    });
    let caps = BAREWORD.captures(line)?;
    match &caps[2] {
        // Leave toml literals alone.
        "true" | "false" | "inf" | "nan" => None,
        word => Some(format!("{}=\"{}\"", &caps[1], word)),
    }
}
