//! JSON payloads exchanged with ACME-style services.

use std::fmt;

use serde::{
    ser::{SerializeMap as _, Serializer},
    Deserialize, Serialize,
};

mod directory;
mod identifier;

pub use self::{
    directory::{Directory, DirectoryMeta},
    identifier::Identifier,
};

/// Content type of [RFC 7807] problem documents.
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
pub const PROBLEM_JSON: &str = "application/problem+json";

const ERROR_NAMESPACE: &str = "urn:ietf:params:acme:error:";

/// Serializes to `""`.
///
/// Used as the payload of POST-as-GET requests.
pub struct EmptyString;

impl Serialize for EmptyString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

/// Serializes to `{}`.
pub struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Problem {
    fn acme(kind: &str, detail: impl Into<String>) -> Self {
        Problem {
            _type: format!("{ERROR_NAMESPACE}{kind}"),
            detail: Some(detail.into()),
            subproblems: None,
        }
    }

    /// A `badNonce` problem, sent when a request carries an unknown or reused nonce.
    pub fn bad_nonce(detail: impl Into<String>) -> Self {
        Self::acme("badNonce", detail)
    }

    /// A `malformed` problem, sent when a request is missing required parts.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::acme("malformed", detail)
    }

    /// Returns true if problem type is "badNonce".
    pub fn is_bad_nonce(&self) -> bool {
        self._type == "badNonce" || self._type == format!("{ERROR_NAMESPACE}badNonce")
    }

    /// Returns true if problem details indicate that JWS verification failed.
    pub fn is_jws_verification_error(&self) -> bool {
        (self._type == "urn:ietf:params:acme:error:malformed"
            || self._type == "urn:acme:error:malformed")
            && self
                .detail
                .as_deref()
                .is_some_and(|detail| detail == "JWS verification error")
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<Identifier>,
}
