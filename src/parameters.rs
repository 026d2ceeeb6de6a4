//! Plain-text parameter files.
//!
//! One parameter per line: the first whitespace separated token is the name,
//! the remaining tokens are its values.
//!
//! ```text
//! # comment
//! NumberOfIterations 5
//! Seeds 12 40 7
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_COMMENT_CHAR: char = '#';

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("failed to read parameter file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parameter '{key}' value '{value}' at position {index} is malformed")]
    Malformed {
        key: String,
        index: usize,
        value: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ParameterDictionary {
    source: PathBuf,
    entries: HashMap<String, Vec<String>>,
}

impl ParameterDictionary {
    /// Read a parameter file using `#` as the comment marker.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParameterError> {
        Self::from_file_with_comment(path, DEFAULT_COMMENT_CHAR)
    }

    /// Read a parameter file, skipping lines that start with `comment_char`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Io`] if the file is missing or unreadable.
    pub fn from_file_with_comment(
        path: impl AsRef<Path>,
        comment_char: char,
    ) -> Result<Self, ParameterError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ParameterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&text, comment_char, path))
    }

    /// Parse parameter text that is already in memory.
    pub fn parse(text: &str, comment_char: char, source: impl Into<PathBuf>) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(comment_char))
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                let key = words.next()?.to_string();
                Some((key, words.map(str::to_string).collect()))
            })
            .collect();

        Self {
            source: source.into(),
            entries,
        }
    }

    /// Values stored under `key`, or `None` if the parameter is absent.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Parse the value at `index` of parameter `key`.
    ///
    /// Absent keys or indices yield `Ok(None)`; a value that does not parse
    /// as `T` is an error.
    pub fn get_parsed<T: FromStr>(&self, key: &str, index: usize) -> Result<Option<T>, ParameterError> {
        let Some(value) = self.get(key).and_then(|values| values.get(index)) else {
            return Ok(None);
        };
        value
            .parse()
            .map(Some)
            .map_err(|_| ParameterError::Malformed {
                key: key.to_string(),
                index,
                value: value.clone(),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl fmt::Display for ParameterDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ParameterDictionary from file \"{}\":", self.source.display())?;
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        for key in keys {
            writeln!(f, "  {key}: {:?}", self.entries[key])?;
        }
        Ok(())
    }
}
