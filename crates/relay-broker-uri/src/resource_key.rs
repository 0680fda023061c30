//! `ResourceKey` — a typed, totally-ordered identifier used by the resource
//! lock service for mutual exclusion (spec §3, §6: `"TYPE:part1[:part2]"`).

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::KeyParseError;

/// Percent-encode `:` (the field separator) plus the usual reserved set so
/// parts round-trip even when they themselves contain colons.
const KEY_PART_ENCODE_SET: &AsciiSet = &CONTROLS.add(b':').add(b'%');

/// A typed tuple rendered `"TYPE:part1[:part2]"`, immutable, hashable, and
/// totally ordered so tasks can sort their resource sets canonically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    resource_type: String,
    parts: Vec<String>,
}

impl ResourceKey {
    /// Build a key from a type tag and one or more identifying parts.
    ///
    /// # Panics
    /// Panics if `parts` is empty — a resource key always identifies
    /// something concrete.
    pub fn new(resource_type: impl Into<String>, parts: Vec<String>) -> Self {
        assert!(
            !parts.is_empty(),
            "ResourceKey requires at least one identifying part"
        );
        Self {
            resource_type: resource_type.into(),
            parts,
        }
    }

    /// Convenience constructor for the common single-part case, e.g.
    /// `ResourceKey::single("ENTITY", "123")`.
    pub fn single(resource_type: impl Into<String>, part: impl Into<String>) -> Self {
        Self::new(resource_type, vec![part.into()])
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Parse the wire form `TYPE:part1[:part2...]`, percent-decoding each part.
    pub fn parse(s: &str) -> Result<Self, KeyParseError> {
        let segments: Vec<&str> = s.split(':').collect();
        if segments.len() < 2 {
            return Err(KeyParseError::BadResourceKeyArity(s.to_string()));
        }
        let resource_type = segments[0];
        if resource_type.is_empty() {
            return Err(KeyParseError::EmptyPart(s.to_string()));
        }
        let mut parts = Vec::with_capacity(segments.len() - 1);
        for segment in &segments[1..] {
            if segment.is_empty() {
                return Err(KeyParseError::EmptyPart(s.to_string()));
            }
            let decoded = percent_decode_str(segment)
                .decode_utf8_lossy()
                .into_owned();
            parts.push(decoded);
        }
        Ok(Self {
            resource_type: resource_type.to_string(),
            parts,
        })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_type)?;
        for part in &self.parts {
            write!(f, ":{}", utf8_percent_encode(part, KEY_PART_ENCODE_SET))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_part() {
        let key = ResourceKey::single("ENTITY", "123");
        let wire = key.to_string();
        assert_eq!(wire, "ENTITY:123");
        assert_eq!(ResourceKey::parse(&wire).unwrap(), key);
    }

    #[test]
    fn round_trips_two_parts() {
        let key = ResourceKey::new("RECORD", vec!["DS".to_string(), "ID1".to_string()]);
        let wire = key.to_string();
        assert_eq!(wire, "RECORD:DS:ID1");
        assert_eq!(ResourceKey::parse(&wire).unwrap(), key);
    }

    #[test]
    fn round_trips_unicode_and_colon_in_part() {
        let key = ResourceKey::new(
            "RECORD",
            vec!["DS:with:colons".to_string(), "caf\u{e9}".to_string()],
        );
        let wire = key.to_string();
        assert_eq!(ResourceKey::parse(&wire).unwrap(), key);
    }

    #[test]
    fn rejects_single_segment() {
        assert!(ResourceKey::parse("ENTITY").is_err());
    }

    #[test]
    fn rejects_empty_part() {
        assert!(ResourceKey::parse("ENTITY:").is_err());
    }

    #[test]
    fn is_totally_ordered() {
        let a = ResourceKey::single("ENTITY", "1");
        let b = ResourceKey::single("ENTITY", "2");
        let c = ResourceKey::single("RECORD", "1");
        assert!(a < b);
        assert!(b < c);
    }
}
