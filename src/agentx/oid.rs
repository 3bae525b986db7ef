//! SNMP object identifiers and their AgentX wire form (RFC 2741 §5.1).

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Sub-identifiers of the `internet` subtree (.1.3.6.1) elided by the prefix byte.
const INTERNET_PREFIX: [u32; 4] = [1, 3, 6, 1];

/// Longest OID SNMP allows (RFC 2578 §3.5).
pub const MAX_OID_LEN: usize = 128;

/// Errors produced when parsing the dotted text form of an OID.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OidParseError {
    #[error("invalid sub-identifier {part:?} in OID {input:?}")]
    InvalidSubId { input: String, part: String },
}

/// An SNMP Object Identifier.
///
/// Ordering is lexicographic over the sub-identifiers, so a prefix sorts
/// before all of its extensions.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(pub Vec<u32>);

impl Oid {
    /// Creates a new OID from a slice of sub-identifiers.
    pub fn from_slice(subs: &[u32]) -> Self {
        Oid(subs.to_vec())
    }

    /// The empty (null) OID.
    pub fn empty() -> Self {
        Oid(Vec::new())
    }

    /// Returns a new OID with `suffix` appended.
    pub fn child(&self, suffix: &[u32]) -> Self {
        let mut subs = Vec::with_capacity(self.0.len() + suffix.len());
        subs.extend_from_slice(&self.0);
        subs.extend_from_slice(suffix);
        Oid(subs)
    }

    /// Returns true if this OID starts with `prefix`.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Returns the number of sub-identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the OID has no sub-identifiers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for sub in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", sub)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    /// Parses dotted decimal, with or without a leading dot.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Ok(Oid::empty());
        }

        trimmed
            .split('.')
            .map(|part| {
                part.parse::<u32>().map_err(|_| OidParseError::InvalidSubId {
                    input: s.to_string(),
                    part: part.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Oid)
    }
}

impl From<&[u32]> for Oid {
    fn from(subs: &[u32]) -> Self {
        Oid::from_slice(subs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(subs: [u32; N]) -> Self {
        Oid(subs.to_vec())
    }
}

/// Appends the RFC 2741 §5.1 encoding of `oid` to `buf`, big-endian.
///
/// Format: n_subid(1) + prefix(1) + include(1) + reserved(1) + sub-identifiers(4 each).
/// OIDs below .1.3.6.1.X with 0 < X <= 255 use the prefix compression.
/// Callers keep OIDs within [`MAX_OID_LEN`]; the sub-identifier count is a single byte.
pub fn encode_oid(buf: &mut Vec<u8>, oid: &Oid, include: bool) {
    let subs = oid.as_slice();

    let (prefix, rest) = match subs {
        [a, b, c, d, x, rest @ ..]
            if [*a, *b, *c, *d] == INTERNET_PREFIX && (1..=255).contains(x) =>
        {
            (*x as u8, rest)
        }
        _ => (0u8, subs),
    };

    buf.reserve(4 + rest.len() * 4);
    buf.push(rest.len() as u8);
    buf.push(prefix);
    buf.push(u8::from(include));
    buf.push(0); // reserved
    for sub in rest {
        buf.extend_from_slice(&sub.to_be_bytes());
    }
}

/// Expands a decoded prefix byte and tail into a full OID.
pub(crate) fn expand_prefix(prefix: u8, tail: Vec<u32>) -> Oid {
    if prefix == 0 {
        return Oid(tail);
    }
    let mut subs = Vec::with_capacity(5 + tail.len());
    subs.extend_from_slice(&INTERNET_PREFIX);
    subs.push(prefix as u32);
    subs.extend(tail);
    Oid(subs)
}
