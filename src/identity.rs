//! Composite identifiers for remote objects that have no single native id.
//!
//! Some cloud objects (a security group rule, a disk attachment) are only
//! addressable through the tuple of values that created them. The tuple is
//! joined with a delimiter into one opaque id string that the host persists
//! and hands back on every later call.

use std::fmt;

use thiserror::Error;

/// Delimiter used when none is given explicitly.
pub const DEFAULT_DELIMITER: char = ':';

/// Ordered list of id parts joined by a fixed delimiter.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CompositeId {
    parts: Vec<String>,
    delimiter: char,
}

impl CompositeId {
    /// Builds an id from `parts` using [`DEFAULT_DELIMITER`].
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Empty`] when no parts are given and
    /// [`IdentityError::DelimiterInPart`] when a part contains the delimiter,
    /// because such an id could not be split back into the same parts.
    pub fn new<I, S>(parts: I) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_delimiter(parts, DEFAULT_DELIMITER)
    }

    /// Builds an id from `parts` joined by `delimiter`.
    ///
    /// # Errors
    ///
    /// See [`CompositeId::new`].
    pub fn with_delimiter<I, S>(parts: I, delimiter: char) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(IdentityError::Empty);
        }
        if let Some(part) = parts.iter().find(|part| part.contains(delimiter)) {
            return Err(IdentityError::DelimiterInPart {
                part: part.clone(),
                delimiter,
            });
        }
        Ok(Self { parts, delimiter })
    }

    /// Splits `raw` on [`DEFAULT_DELIMITER`] and checks the part count.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::PartCount`] when the number of parts differs
    /// from `expected`.
    pub fn parse(raw: &str, expected: usize) -> Result<Self, IdentityError> {
        Self::parse_with(raw, expected, DEFAULT_DELIMITER)
    }

    /// Splits `raw` on `delimiter` and checks the part count.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Empty`] for a blank id of more than one part
    /// and [`IdentityError::PartCount`] when the number of parts differs from
    /// `expected`. A blank id is the single empty part.
    pub fn parse_with(raw: &str, expected: usize, delimiter: char) -> Result<Self, IdentityError> {
        if raw.is_empty() && expected != 1 {
            return Err(IdentityError::Empty);
        }
        let parts: Vec<String> = raw.split(delimiter).map(str::to_owned).collect();
        if parts.len() != expected {
            return Err(IdentityError::PartCount {
                id: raw.to_owned(),
                expected,
                found: parts.len(),
            });
        }
        Ok(Self { parts, delimiter })
    }

    /// Returns all parts in order.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Returns the part at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MissingPart`] when `index` is out of range.
    pub fn part(&self, index: usize) -> Result<&str, IdentityError> {
        self.parts
            .get(index)
            .map(String::as_str)
            .ok_or(IdentityError::MissingPart {
                index,
                len: self.parts.len(),
            })
    }

    /// Consumes the id and returns its parts.
    #[must_use]
    pub fn into_parts(self) -> Vec<String> {
        self.parts
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                write!(f, "{}", self.delimiter)?;
            }
            first = false;
            f.write_str(part)?;
        }
        Ok(())
    }
}

/// Errors raised while building or parsing a [`CompositeId`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IdentityError {
    /// Raised for an id with no parts.
    #[error("composite id must not be empty")]
    Empty,
    /// Raised when a part would make the joined id ambiguous.
    #[error("id part {part:?} contains the delimiter {delimiter:?}")]
    DelimiterInPart {
        /// Offending part.
        part: String,
        /// Delimiter in use.
        delimiter: char,
    },
    /// Raised when a stored id has the wrong shape.
    #[error("invalid id {id:?}: expected {expected} parts, found {found}")]
    PartCount {
        /// Raw id that failed to parse.
        id: String,
        /// Number of parts the resource type uses.
        expected: usize,
        /// Number of parts present.
        found: usize,
    },
    /// Raised when a caller asks for a part past the end.
    #[error("id part {index} requested but the id has {len} parts")]
    MissingPart {
        /// Requested index.
        index: usize,
        /// Number of parts present.
        len: usize,
    },
}
