//! Argument shapes and typed accessors for verb arguments.
//!
//! Arguments are split on `,` with no escaping. Verbs whose final argument is
//! free text (speech, display text, serial payloads) declare a trailing-text
//! shape so commas inside that text survive.

use crate::runtime::error::{DispatchError, DispatchResult};
use std::collections::BTreeMap;
use std::fmt;

/// Declared argument shape for a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgShape {
    /// Minimum number of arguments.
    pub min: usize,
    /// Maximum number of arguments (`None` for unbounded).
    pub max: Option<usize>,
    /// Whether the last permitted argument swallows the remaining text.
    pub trailing_text: bool,
}

impl ArgShape {
    /// No arguments.
    pub const NONE: ArgShape = ArgShape {
        min: 0,
        max: Some(0),
        trailing_text: false,
    };

    /// Exactly `n` arguments.
    pub const fn exact(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
            trailing_text: false,
        }
    }

    /// Between `min` and `max` arguments.
    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
            trailing_text: false,
        }
    }

    /// At least `min` arguments.
    pub const fn at_least(min: usize) -> Self {
        Self {
            min,
            max: None,
            trailing_text: false,
        }
    }

    /// `leading` plain arguments followed by one free-text argument.
    pub const fn text_after(leading: usize) -> Self {
        Self {
            min: leading + 1,
            max: Some(leading + 1),
            trailing_text: true,
        }
    }

    fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// Split, shape-checked arguments for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    verb: String,
    values: Vec<String>,
}

impl Args {
    /// Split `raw` according to `shape` and validate the count.
    pub fn parse(verb: &str, raw: &str, shape: ArgShape) -> DispatchResult<Self> {
        let raw = raw.trim();
        let values: Vec<String> = if raw.is_empty() {
            Vec::new()
        } else if shape.trailing_text {
            // `max` is always set for trailing-text shapes.
            let parts = shape.max.unwrap_or(1).max(1);
            raw.splitn(parts, ',').map(|s| s.trim().to_string()).collect()
        } else {
            raw.split(',').map(|s| s.trim().to_string()).collect()
        };

        if !shape.accepts(values.len()) {
            return Err(DispatchError::Arity {
                verb: verb.to_string(),
                expected: shape.to_string(),
                received: values.len(),
            });
        }

        Ok(Self {
            verb: verb.to_string(),
            values,
        })
    }

    /// Verb these arguments belong to.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no arguments were supplied.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw argument text at `index`.
    pub fn str(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Argument at `index` with one layer of surrounding quotes removed.
    pub fn unquoted(&self, index: usize) -> Option<&str> {
        self.str(index).map(unquote)
    }

    /// Required float argument.
    pub fn f64(&self, index: usize) -> DispatchResult<f64> {
        self.opt_f64(index)?
            .ok_or_else(|| self.invalid(index, "number"))
    }

    /// Optional float argument; empty positions yield `None`.
    pub fn opt_f64(&self, index: usize) -> DispatchResult<Option<f64>> {
        match self.str(index) {
            None | Some("") => Ok(None),
            Some(text) => text
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(index, "number")),
        }
    }

    /// Required non-negative integer argument.
    pub fn u64(&self, index: usize) -> DispatchResult<u64> {
        let text = self.str(index).unwrap_or_default();
        // Authored data often carries decimals ("500.0") for durations.
        if let Ok(value) = text.parse::<u64>() {
            return Ok(value);
        }
        match text.parse::<f64>() {
            Ok(value) if value >= 0.0 && value.is_finite() => Ok(value.round() as u64),
            _ => Err(self.invalid(index, "non-negative integer")),
        }
    }

    /// Required colour channel argument.
    pub fn u8(&self, index: usize) -> DispatchResult<u8> {
        let value = self.u64(index).map_err(|_| self.invalid(index, "0-255 value"))?;
        u8::try_from(value).map_err(|_| self.invalid(index, "0-255 value"))
    }

    /// Optional boolean; accepts `true/false`, `yes/no`, `on/off`, `1/0`.
    pub fn opt_bool(&self, index: usize) -> DispatchResult<Option<bool>> {
        match self.str(index) {
            None | Some("") => Ok(None),
            Some(text) => parse_bool(text)
                .map(Some)
                .ok_or_else(|| self.invalid(index, "boolean")),
        }
    }

    /// Required boolean.
    pub fn bool(&self, index: usize) -> DispatchResult<bool> {
        self.opt_bool(index)?
            .ok_or_else(|| self.invalid(index, "boolean"))
    }

    /// Required non-empty string argument.
    pub fn text(&self, index: usize) -> DispatchResult<&str> {
        match self.str(index) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(self.invalid(index, "non-empty text")),
        }
    }

    /// `key=value` pairs starting at `from`; bare keys map to an empty value.
    pub fn key_values(&self, from: usize) -> BTreeMap<String, String> {
        self.values
            .iter()
            .skip(from)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (entry.trim().to_string(), String::new()),
            })
            .collect()
    }

    /// Conversion error for the argument at `index`.
    pub fn invalid(&self, index: usize, expected: &'static str) -> DispatchError {
        DispatchError::InvalidArgument {
            verb: self.verb.clone(),
            index,
            value: self.str(index).unwrap_or_default().to_string(),
            expected,
        }
    }
}

/// Strip one layer of matching single or double quotes.
pub fn unquote(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_text_keeps_commas() {
        let args = Args::parse("SPEAK", "Hello, my friend, hello", ArgShape::text_after(0)).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.str(0), Some("Hello, my friend, hello"));

        let args = Args::parse("EVENT", "bump, front, ouch, that hurt", ArgShape::text_after(2))
            .unwrap();
        assert_eq!(args.str(2), Some("ouch, that hurt"));
    }

    #[test]
    fn arity_is_enforced() {
        let err = Args::parse("HEAD", "1,2", ArgShape::exact(4)).unwrap_err();
        assert!(matches!(err, DispatchError::Arity { received: 2, .. }));
        assert!(Args::parse("STOP", "", ArgShape::NONE).is_ok());
        assert!(Args::parse("AUDIO", "a.wav,40,extra", ArgShape::range(1, 2)).is_err());
    }

    #[test]
    fn empty_numeric_positions_are_none() {
        let args = Args::parse("HEAD", "10,,-5,500", ArgShape::exact(4)).unwrap();
        assert_eq!(args.opt_f64(0).unwrap(), Some(10.0));
        assert_eq!(args.opt_f64(1).unwrap(), None);
        assert_eq!(args.opt_f64(2).unwrap(), Some(-5.0));
        assert_eq!(args.u64(3).unwrap(), 500);
    }

    #[test]
    fn conversion_failures_name_the_argument() {
        let args = Args::parse("PAUSE", "soon", ArgShape::exact(1)).unwrap();
        match args.u64(0).unwrap_err() {
            DispatchError::InvalidArgument { index, value, .. } => {
                assert_eq!(index, 0);
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn quotes_and_key_values() {
        let args = Args::parse("AWAIT-SYNC", "\"foo\",1000", ArgShape::exact(2)).unwrap();
        assert_eq!(args.unquoted(0), Some("foo"));

        let args = Args::parse("START-SKILL", "abc,mode=fast,debug", ArgShape::at_least(1)).unwrap();
        let params = args.key_values(1);
        assert_eq!(params.get("mode").map(String::as_str), Some("fast"));
        assert_eq!(params.get("debug").map(String::as_str), Some(""));
    }
}
