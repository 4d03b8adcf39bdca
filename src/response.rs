use std::borrow::Cow;

use http::{header, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    api::{Problem, PROBLEM_JSON},
    error::{Error, Result},
};

/// Response produced by every transport, regardless of the HTTP engine behind it.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    url: String,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>, url: String) -> Self {
        Response {
            status,
            headers,
            body,
            url,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of header `name`, if present and valid UTF-8.
    pub fn header<K: header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn expect_header(&self, name: &str) -> Result<String> {
        self.header(name)
            .map(ToOwned::to_owned)
            .ok_or_else(|| Error::MissingHeader(name.to_owned()))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    /// The URL the request was sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Interprets a non-2xx response as a problem document.
    ///
    /// `application/problem+json` bodies are decoded; any other error response is described by a
    /// synthetic `httpReqError` problem carrying the status line and body.
    pub fn problem(&self) -> Option<Problem> {
        if self.is_success() {
            return None;
        }

        let is_problem_json = self
            .content_type()
            .is_some_and(|content_type| content_type.starts_with(PROBLEM_JSON));

        let problem = if is_problem_json {
            serde_json::from_slice(&self.body).unwrap_or_else(|err| Problem {
                _type: "problemJsonFail".to_owned(),
                detail: Some(format!(
                    "Failed to deserialize application/problem+json ({err}) body: {}",
                    self.text()
                )),
                subproblems: None,
            })
        } else {
            Problem {
                _type: "httpReqError".to_owned(),
                detail: Some(format!("{} body: {}", self.status, self.text())),
                subproblems: None,
            }
        };

        Some(problem)
    }

    /// Passes 2xx responses through and turns everything else into [`Error::Api`].
    pub fn error_for_status(self) -> Result<Self> {
        match self.problem() {
            None => Ok(self),
            Some(problem) => Err(Error::Api {
                status: self.status,
                problem,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn response(status: StatusCode, content_type: Option<&'static str>, body: &str) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        Response::new(
            status,
            headers,
            body.as_bytes().to_vec(),
            "http://bastion/".to_owned(),
        )
    }

    #[test]
    fn test_success_passes_through() {
        let res = response(StatusCode::OK, None, "ok");
        assert!(res.problem().is_none());
        assert_eq!(res.error_for_status().unwrap().text(), "ok");
    }

    #[test]
    fn test_problem_json() {
        let res = response(
            StatusCode::BAD_REQUEST,
            Some("application/problem+json"),
            r#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"stale"}"#,
        );

        let problem = res.problem().unwrap();
        assert!(problem.is_bad_nonce());
        assert_eq!(problem.detail.as_deref(), Some("stale"));

        let err = res.error_for_status().unwrap_err();
        assert!(matches!(err, Error::Api { status: StatusCode::BAD_REQUEST, .. }));
        assert!(err.problem().unwrap().is_bad_nonce());
    }

    #[test]
    fn test_broken_problem_json() {
        let res = response(StatusCode::BAD_REQUEST, Some(PROBLEM_JSON), "{not json");
        assert_eq!(res.problem().unwrap()._type, "problemJsonFail");
    }

    #[test]
    fn test_plain_error() {
        let res = response(StatusCode::NOT_FOUND, Some("text/plain"), "nope");
        let problem = res.problem().unwrap();

        assert_eq!(problem._type, "httpReqError");
        assert_eq!(problem.detail.as_deref(), Some("404 Not Found body: nope"));
    }

    #[test]
    fn test_expect_header() {
        let res = response(StatusCode::OK, Some("text/plain"), "");

        assert_eq!(res.expect_header("content-type").unwrap(), "text/plain");
        assert!(matches!(
            res.expect_header("replay-nonce"),
            Err(Error::MissingHeader(name)) if name == "replay-nonce"
        ));
    }
}
