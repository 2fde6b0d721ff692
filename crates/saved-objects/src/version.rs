//! Optimistic-concurrency version tokens.
//!
//! The backing store tracks every document revision with a
//! `(_seq_no, _primary_term)` pair. Callers never see the pair directly: it is
//! carried as an opaque [`VersionToken`], the standard base64 encoding of the
//! JSON array `[seq_no, primary_term]`.
//!
//! ```
//! use helios_saved_objects::version::{decode_version, encode_version};
//!
//! let token = encode_version(5, 1);
//! assert_eq!(token.as_str(), "WzUsMV0=");
//!
//! let decoded = decode_version(token.as_str()).unwrap();
//! assert_eq!((decoded.seq_no, decoded.primary_term), (5, 1));
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::VersionError;

/// The store-internal revision pair behind a version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceVersion {
    /// The document's sequence number (`_seq_no`).
    pub seq_no: u64,
    /// The primary term the sequence number was issued under (`_primary_term`).
    pub primary_term: u64,
}

impl SequenceVersion {
    /// Creates a new revision pair.
    pub fn new(seq_no: u64, primary_term: u64) -> Self {
        Self {
            seq_no,
            primary_term,
        }
    }

    /// Encodes this pair as an opaque token.
    pub fn to_token(self) -> VersionToken {
        encode_version(self.seq_no, self.primary_term)
    }
}

/// An opaque concurrency token identifying one exact document revision.
///
/// Tokens always hold the canonical encoding, so two tokens are equal iff
/// their underlying `(seq_no, primary_term)` pairs are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VersionToken {
    encoded: String,
    version: SequenceVersion,
}

impl VersionToken {
    /// Parses a caller-supplied token, normalizing it to the canonical encoding.
    pub fn parse(token: &str) -> Result<Self, VersionError> {
        let version = decode_version(token)?;
        Ok(version.to_token())
    }

    /// Returns the encoded token.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Returns the revision pair this token was issued for.
    pub fn sequence_version(&self) -> SequenceVersion {
        self.version
    }
}

impl fmt::Debug for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VersionToken")
            .field(&self.encoded)
            .field(&self.version.seq_no)
            .field(&self.version.primary_term)
            .finish()
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl Serialize for VersionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encoded.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VersionToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionToken::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Encodes a `(seq_no, primary_term)` pair into a version token.
pub fn encode_version(seq_no: u64, primary_term: u64) -> VersionToken {
    let encoded = STANDARD.encode(format!("[{},{}]", seq_no, primary_term));
    VersionToken {
        encoded,
        version: SequenceVersion::new(seq_no, primary_term),
    }
}

/// Encodes the version of a store hit, which must carry both halves of the pair.
pub fn encode_hit_version(
    seq_no: Option<u64>,
    primary_term: Option<u64>,
) -> Result<VersionToken, VersionError> {
    match (seq_no, primary_term) {
        (Some(seq_no), Some(primary_term)) => Ok(encode_version(seq_no, primary_term)),
        (seq_no, primary_term) => Err(VersionError::InvalidVersionInput {
            message: format!(
                "got _seq_no={:?} and _primary_term={:?}",
                seq_no, primary_term
            ),
        }),
    }
}

/// Decodes a version token back into its `(seq_no, primary_term)` pair.
pub fn decode_version(token: &str) -> Result<SequenceVersion, VersionError> {
    let malformed = || VersionError::MalformedVersionToken {
        token: token.to_string(),
    };

    let bytes = STANDARD.decode(token.trim()).map_err(|_| malformed())?;
    let parts: Vec<Value> = serde_json::from_slice(&bytes).map_err(|_| malformed())?;

    match parts.as_slice() {
        [seq_no, primary_term] => {
            let seq_no = seq_no.as_u64().ok_or_else(malformed)?;
            let primary_term = primary_term.as_u64().ok_or_else(malformed)?;
            Ok(SequenceVersion::new(seq_no, primary_term))
        }
        _ => Err(malformed()),
    }
}

/// Decodes an optional caller-supplied version into store request properties.
///
/// `None` means the caller did not ask for a concurrency check.
pub fn decode_request_version(
    version: Option<&str>,
) -> Result<Option<SequenceVersion>, VersionError> {
    version.map(decode_version).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_value() {
        assert_eq!(encode_version(5, 1).as_str(), "WzUsMV0=");
        assert_eq!(encode_version(0, 1).as_str(), "WzAsMV0=");
    }

    #[test]
    fn test_round_trip() {
        for (seq_no, primary_term) in [(0, 1), (1, 1), (42, 7), (u64::MAX, u64::MAX)] {
            let token = encode_version(seq_no, primary_term);
            let decoded = decode_version(token.as_str()).unwrap();
            assert_eq!(decoded, SequenceVersion::new(seq_no, primary_term));
        }
    }

    #[test]
    fn test_tokens_equal_iff_pairs_equal() {
        assert_eq!(encode_version(3, 2), encode_version(3, 2));
        assert_ne!(encode_version(3, 2), encode_version(2, 3));
        assert_ne!(encode_version(3, 2), encode_version(4, 2));
    }

    #[test]
    fn test_parse_normalizes_whitespace() {
        let loose = STANDARD.encode("[ 3 , 2 ]");
        let token = VersionToken::parse(&loose).unwrap();
        assert_eq!(token, encode_version(3, 2));
        assert_eq!(token.as_str(), encode_version(3, 2).as_str());
    }

    #[test]
    fn test_hit_version_requires_both_halves() {
        assert!(encode_hit_version(Some(1), Some(1)).is_ok());
        assert!(matches!(
            encode_hit_version(None, Some(1)),
            Err(VersionError::InvalidVersionInput { .. })
        ));
        assert!(matches!(
            encode_hit_version(Some(1), None),
            Err(VersionError::InvalidVersionInput { .. })
        ));
    }

    #[test]
    fn test_decode_malformed() {
        let cases = [
            "not base64!".to_string(),
            STANDARD.encode("[1]"),
            STANDARD.encode("[1,2,3]"),
            STANDARD.encode("[\"a\",1]"),
            STANDARD.encode("[-1,1]"),
            STANDARD.encode("{\"seq\":1}"),
            String::new(),
        ];
        for token in cases {
            assert_eq!(
                decode_version(&token),
                Err(VersionError::MalformedVersionToken {
                    token: token.clone()
                }),
                "token {:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_decode_request_version() {
        assert_eq!(decode_request_version(None).unwrap(), None);
        let token = encode_version(9, 4);
        assert_eq!(
            decode_request_version(Some(token.as_str())).unwrap(),
            Some(SequenceVersion::new(9, 4))
        );
        assert!(decode_request_version(Some("garbage")).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let token = encode_version(7, 3);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"WzcsM10=\"");
        let back: VersionToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
        assert!(serde_json::from_str::<VersionToken>("\"nope\"").is_err());
    }
}
