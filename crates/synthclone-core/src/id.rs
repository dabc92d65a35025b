//! Hierarchical participant identifiers.
//!
//! A participant id is a dot-delimited list of sub-ids. Each sub-id starts and
//! ends with an ASCII letter or digit and may contain hyphens in between:
//!
//! ```text
//! valid:   a   a.b   a.bc   a.b-c   a.b--c
//! invalid: a.  .a.b  a..b   a.b.    a.-b   a.-  -
//! ```

use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SessionError;

/// A validated, dot-delimited participant identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(CompactString);

impl ParticipantId {
    /// Parse and validate an id.
    pub fn parse(id: &str) -> Result<Self, SessionError> {
        if Self::is_valid(id) {
            Ok(Self(CompactString::from(id)))
        } else {
            Err(SessionError::InvalidParticipantId { id: id.to_string() })
        }
    }

    /// Check whether a full, dotted id is well formed.
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty() && id.split('.').all(Self::is_valid_sub_id)
    }

    /// Check whether a single sub-id (no dots) is well formed.
    pub fn is_valid_sub_id(sub_id: &str) -> bool {
        let bytes = sub_id.as_bytes();
        let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
            return false;
        };
        first.is_ascii_alphanumeric()
            && last.is_ascii_alphanumeric()
            && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
    }

    /// Build a child id by appending `sub_id` under `self`.
    pub fn child(&self, sub_id: &str) -> Result<Self, SessionError> {
        if !Self::is_valid_sub_id(sub_id) {
            return Err(SessionError::InvalidParticipantId {
                id: format!("{}.{sub_id}", self.0),
            });
        }
        let mut id = self.0.clone();
        id.push('.');
        id.push_str(sub_id);
        Ok(Self(id))
    }

    /// Id of the parent namespace, if this is not a root id.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| Self(CompactString::from(parent)))
    }

    /// The last sub-id.
    pub fn sub_id(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Number of sub-ids.
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ParticipantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = CompactString::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
