//! Continuation tokens
//!
//! A backend hands out raw markers that only make sense for the request that
//! produced them. Before a marker leaves the lister it is sealed together
//! with the request fingerprint, so a token replayed against another request
//! is refused instead of silently listing the wrong thing.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::request::Fingerprint;

const ENVELOPE_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u8,
    fp: String,
    m: String,
}

/// Opaque cursor pointing at the next page of a listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Bind a backend marker to the request fingerprint
    pub(crate) fn seal(fingerprint: &Fingerprint, marker: &str) -> Result<Self> {
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            fp: URL_SAFE_NO_PAD.encode(fingerprint.as_bytes()),
            m: marker.to_string(),
        };
        let json = serde_json::to_vec(&envelope)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(json)))
    }

    /// Recover the backend marker, checking it belongs to `fingerprint`
    pub(crate) fn open(&self, fingerprint: &Fingerprint) -> Result<String> {
        let json = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|_| malformed())?;
        let envelope: Envelope = serde_json::from_slice(&json).map_err(|_| malformed())?;

        if envelope.v != ENVELOPE_VERSION {
            return Err(Error::InvalidContinuationToken(format!(
                "unsupported token version {}",
                envelope.v
            )));
        }

        if envelope.fp != URL_SAFE_NO_PAD.encode(fingerprint.as_bytes()) {
            return Err(Error::InvalidContinuationToken(
                "token was issued for a different list request".into(),
            ));
        }

        if envelope.m.is_empty() {
            return Err(malformed());
        }

        Ok(envelope.m)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn malformed() -> Error {
    Error::InvalidContinuationToken("token is malformed".into())
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContinuationToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(malformed());
        }
        Ok(Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ListRequest;

    fn fingerprint(request: &ListRequest) -> Fingerprint {
        request.fingerprint().unwrap()
    }

    #[test]
    fn test_seal_and_open() {
        let fp = fingerprint(&ListRequest::blobs("photos"));
        let token = ContinuationToken::seal(&fp, "marker-42").unwrap();
        assert!(!token.as_str().contains("marker-42"));
        assert_eq!(token.open(&fp).unwrap(), "marker-42");
    }

    #[test]
    fn test_open_with_other_request_fails() {
        let fp = fingerprint(&ListRequest::blobs("photos"));
        let other = fingerprint(&ListRequest::blobs("photos").with_page_size(5));
        let token = ContinuationToken::seal(&fp, "marker-42").unwrap();

        let err = token.open(&other).unwrap_err();
        assert!(matches!(err, Error::InvalidContinuationToken(_)));
        assert!(err.to_string().contains("different list request"));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let fp = fingerprint(&ListRequest::containers());
        for raw in ["not base64 !!", "bm90IGpzb24", "e30"] {
            let token: ContinuationToken = raw.parse().unwrap();
            let err = token.open(&fp).unwrap_err();
            assert!(
                matches!(err, Error::InvalidContinuationToken(_)),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn test_empty_string_does_not_parse() {
        assert!("".parse::<ContinuationToken>().is_err());
        assert!("  ".parse::<ContinuationToken>().is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let fp = fingerprint(&ListRequest::containers());
        let token = ContinuationToken::seal(&fp, "m").unwrap();
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", token.as_str()));
    }
}
