use std::{sync::Arc, time::Duration};

use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method,
};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    jws::FlattenedJsonJws,
    url::QueryString,
};

pub(crate) const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub(crate) const APPLICATION_JSON: &str = "application/json";
pub(crate) const JOSE_JSON: &str = "application/jose+json";

/// Hook that rewrites the options of every outgoing request.
///
/// Receives the request method and the options after header merging; whatever it returns is what
/// gets dispatched to the HTTP engine.
pub type KwargsUpdater = Arc<dyn Fn(&Method, RequestOptions) -> RequestOptions + Send + Sync>;

/// Payload of a write request.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Sent as-is without a content type.
    Text(String),

    /// Sent as-is without a content type.
    Bytes(Vec<u8>),

    /// URL-form-encoded key/value pairs.
    Form(Vec<(String, String)>),

    Json(Value),

    /// A signed ACME request, sent as `application/jose+json`.
    Jose(FlattenedJsonJws),
}

impl Body {
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Body::Form(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Encodes the body, returning its default content type (if any) and bytes.
    pub(crate) fn encode(self) -> Result<(Option<&'static str>, Vec<u8>)> {
        Ok(match self {
            Body::Text(text) => (None, text.into_bytes()),
            Body::Bytes(bytes) => (None, bytes),
            Body::Form(pairs) => {
                let encoded = serde_urlencoded::to_string(&pairs)
                    .map_err(|err| Error::MalformedBody(err.to_string()))?;
                (Some(FORM_URLENCODED), encoded.into_bytes())
            }
            Body::Json(value) => (Some(APPLICATION_JSON), serde_json::to_vec(&value)?),
            Body::Jose(jws) => (Some(JOSE_JSON), serde_json::to_vec(&jws)?),
        })
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

/// Per-call options recognized by every transport verb.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Merged over the transport's basic headers; these win on conflict.
    pub headers: HeaderMap,

    pub query_string: Option<QueryString>,

    pub body: Option<Body>,

    /// Passed through to the engine as the whole-request timeout.
    pub timeout: Option<Duration>,

    /// Turn non-2xx responses into [`Error::Api`] instead of returning them.
    pub error_for_status: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, query: impl Into<QueryString>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn error_for_status(mut self, enabled: bool) -> Self {
        self.error_for_status = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_encode_form() {
        let body = Body::form([("name", "peasant"), ("kind", "a b")]);
        let (content_type, bytes) = body.encode().unwrap();

        assert_eq!(content_type, Some(FORM_URLENCODED));
        assert_eq!(bytes, b"name=peasant&kind=a+b");
    }

    #[test]
    fn test_encode_json() {
        let (content_type, bytes) = Body::Json(json!({ "termsOfServiceAgreed": true }))
            .encode()
            .unwrap();

        assert_eq!(content_type, Some(APPLICATION_JSON));
        assert_eq!(bytes, br#"{"termsOfServiceAgreed":true}"#);
    }

    #[test]
    fn test_encode_text() {
        let (content_type, bytes) = Body::from("da body").encode().unwrap();

        assert_eq!(content_type, None);
        assert_eq!(bytes, b"da body");
    }

    #[test]
    fn test_builder() {
        let options = RequestOptions::new()
            .header(
                HeaderName::from_static("x-peasant"),
                HeaderValue::from_static("1"),
            )
            .query("a=1")
            .body("payload")
            .timeout(Duration::from_secs(5))
            .error_for_status(true);

        assert_eq!(options.headers["x-peasant"], "1");
        assert_eq!(options.query_string.unwrap().as_str(), "a=1");
        assert_eq!(options.body, Some(Body::Text("payload".to_owned())));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert!(options.error_for_status);
    }
}
