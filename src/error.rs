use http::StatusCode;

use crate::api::Problem;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by transports, clients and the security helpers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport could not be constructed.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    /// A query string value was neither a pre-encoded string nor a sequence of key/value pairs.
    #[error("malformed query string: {0}")]
    MalformedQuery(#[source] serde_urlencoded::ser::Error),

    /// A request body could not be encoded.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// The transport does not provide this operation.
    ///
    /// This is a programming error; a correctly composed client never sees it.
    #[error("transport does not implement `{0}`")]
    NotImplemented(&'static str),

    /// The transport has no owning client, or the client has been dropped.
    #[error("transport is not attached to a client")]
    Detached,

    /// The server directory does not advertise the named endpoint.
    #[error("directory has no `{0}` endpoint")]
    MissingEndpoint(String),

    #[error("response is missing the `{0}` header")]
    MissingHeader(String),

    /// A non-2xx response, raised because the caller asked for it.
    #[error("{status}: {problem}")]
    Api { status: StatusCode, problem: Problem },

    /// Connection or engine failure.
    #[error("request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("key error: {0}")]
    Key(String),
}

impl Error {
    pub(crate) fn http<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Http(Box::new(err))
    }

    /// Returns the problem document of an [`Error::Api`].
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            Error::Api { problem, .. } => Some(problem),
            _ => None,
        }
    }
}
