//! The contract every HTTP engine binding satisfies, and the state the bundled bindings share.
//!
//! A transport performs the actual HTTP I/O for a client. There is one trait per concurrency
//! model: [`Transport`] for blocking engines and [`AsyncTransport`] for async ones. Both build on
//! [`TransportBase`], which covers URL resolution, the request options hook and the link back to
//! the owning client.
//!
//! Every method of the verb and lifecycle traits has a default that fails with
//! [`Error::NotImplemented`]; bindings override what their engine supports.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use http::{
    header::{self, HeaderName, HeaderValue},
    HeaderMap, Method,
};

use crate::{
    error::{Error, Result},
    options::{KwargsUpdater, RequestOptions},
    peasant::PeasantHandle,
    response::Response,
    url::{compose_url, has_scheme, normalize_base},
    Directory,
};

#[cfg(feature = "ureq")]
mod blocking;
#[cfg(feature = "reqwest")]
mod nonblocking;

#[cfg(feature = "ureq")]
pub use self::blocking::UreqTransport;
#[cfg(feature = "reqwest")]
pub use self::nonblocking::ReqwestTransport;

/// Header carrying the anti-replay nonce in ACME.
pub const REPLAY_NONCE: &str = "replay-nonce";

/// Directory key of the endpoint handing out fresh nonces.
pub const NEW_NONCE: &str = "newNonce";

/// `<library>/<version>`, the first half of every user agent.
pub const LIBRARY_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Capabilities shared by blocking and async transports.
pub trait TransportBase {
    /// Normalized address of the remote service.
    fn base_address(&self) -> &str;

    /// Link to the owning client, set when the transport is handed to one.
    fn peasant(&self) -> Option<&PeasantHandle>;

    fn set_peasant(&mut self, peasant: PeasantHandle);

    fn kwargs_updater(&self) -> Option<&KwargsUpdater> {
        None
    }

    /// Resolves `path` against the base address, or uses it as-is when it is an absolute URL.
    fn get_url(&self, path: &str, options: &RequestOptions) -> String {
        compose_url(self.base_address(), path, options.query_string.as_ref())
    }

    /// Applies the kwargs updater, if any, to the options of a request about to be sent.
    fn update_kwargs(&self, method: &Method, options: RequestOptions) -> RequestOptions {
        match self.kwargs_updater() {
            Some(updater) => updater(method, options),
            None => options,
        }
    }
}

/// Transport bound to a blocking HTTP engine.
///
/// Every call completes before returning.
pub trait Transport: TransportBase {
    fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("get"))
    }

    fn head(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("head"))
    }

    fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("post"))
    }

    fn put(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("put"))
    }

    fn patch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("patch"))
    }

    fn delete(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("delete"))
    }

    fn options(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("options"))
    }

    /// Fetches the service directory and stores it in the owning client's cache.
    ///
    /// The cache is populated by the time this returns `Ok`.
    fn set_directory(&self) -> Result<()> {
        Err(Error::NotImplemented("set_directory"))
    }

    /// Fetches a fresh anti-replay nonce.
    fn new_nonce(&self) -> Result<String> {
        Err(Error::NotImplemented("new_nonce"))
    }

    /// Whether this client identity is already registered with the service.
    fn is_registered(&self) -> Result<bool> {
        Err(Error::NotImplemented("is_registered"))
    }
}

/// Transport bound to an async HTTP engine.
///
/// Every call is a suspension point; the response is only available once the returned future
/// resolves.
#[async_trait]
pub trait AsyncTransport: TransportBase + Send + Sync {
    async fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("get"))
    }

    async fn head(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("head"))
    }

    async fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("post"))
    }

    async fn put(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("put"))
    }

    async fn patch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("patch"))
    }

    async fn delete(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("delete"))
    }

    async fn options(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let _ = (path, options);
        Err(Error::NotImplemented("options"))
    }

    /// Fetches the service directory and stores it in the owning client's cache.
    ///
    /// The cache is populated by the time the returned future resolves to `Ok`.
    async fn set_directory(&self) -> Result<()> {
        Err(Error::NotImplemented("set_directory"))
    }

    async fn new_nonce(&self) -> Result<String> {
        Err(Error::NotImplemented("new_nonce"))
    }

    async fn is_registered(&self) -> Result<bool> {
        Err(Error::NotImplemented("is_registered"))
    }
}

/// State shared by the bundled transports.
///
/// Holds everything that is fixed once the transport is built: the base address, the default
/// headers, the kwargs updater and where to find the directory and nonces.
#[derive(Clone)]
pub(crate) struct TransportCore {
    base_address: String,
    basic_headers: HeaderMap,
    kwargs_updater: Option<KwargsUpdater>,
    directory_path: String,
    nonce_header: HeaderName,
    peasant: Option<PeasantHandle>,
}

impl TransportCore {
    /// Validates `address` and computes the basic headers for `engine` (`<name>/<version>`).
    ///
    /// Paths are appended to the base address, so it may not carry a query or a fragment.
    pub(crate) fn new(address: &str, engine: &str) -> Result<Self> {
        if !has_scheme(address) {
            return Err(Error::Config(format!(
                "base address must be an absolute http(s) URL, got {address:?}"
            )));
        }

        if address.contains(['?', '#']) {
            return Err(Error::Config(format!(
                "base address may not have a query or fragment, got {address:?}"
            )));
        }

        let user_agent = format!("{LIBRARY_AGENT} {engine}");
        let user_agent = HeaderValue::from_str(&user_agent)
            .map_err(|err| Error::Config(format!("invalid user agent: {err}")))?;

        let mut basic_headers = HeaderMap::new();
        basic_headers.insert(header::USER_AGENT, user_agent);

        Ok(TransportCore {
            base_address: normalize_base(address),
            basic_headers,
            kwargs_updater: None,
            directory_path: String::new(),
            nonce_header: HeaderName::from_static(REPLAY_NONCE),
            peasant: None,
        })
    }

    pub(crate) fn base_address(&self) -> &str {
        &self.base_address
    }

    pub(crate) fn user_agent(&self) -> &str {
        self.basic_headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(LIBRARY_AGENT)
    }

    pub(crate) fn basic_headers(&self) -> &HeaderMap {
        &self.basic_headers
    }

    pub(crate) fn set_basic_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.basic_headers.insert(name, value);
    }

    pub(crate) fn kwargs_updater(&self) -> Option<&KwargsUpdater> {
        self.kwargs_updater.as_ref()
    }

    pub(crate) fn set_kwargs_updater<F>(&mut self, updater: F)
    where
        F: Fn(&Method, RequestOptions) -> RequestOptions + Send + Sync + 'static,
    {
        self.kwargs_updater = Some(Arc::new(updater));
    }

    pub(crate) fn directory_path(&self) -> &str {
        &self.directory_path
    }

    pub(crate) fn set_directory_path(&mut self, path: impl Into<String>) {
        self.directory_path = path.into();
    }

    pub(crate) fn nonce_header(&self) -> &HeaderName {
        &self.nonce_header
    }

    pub(crate) fn set_nonce_header(&mut self, name: HeaderName) {
        self.nonce_header = name;
    }

    pub(crate) fn peasant(&self) -> Option<&PeasantHandle> {
        self.peasant.as_ref()
    }

    pub(crate) fn set_peasant(&mut self, peasant: PeasantHandle) {
        self.peasant = Some(peasant);
    }

    /// The owning client, if it is still alive.
    pub(crate) fn attached(&self) -> Result<&PeasantHandle> {
        self.peasant
            .as_ref()
            .filter(|peasant| peasant.is_attached())
            .ok_or(Error::Detached)
    }

    /// Basic headers overlaid with `headers`; names present in `headers` replace the defaults.
    pub(crate) fn merge_headers(&self, headers: &HeaderMap) -> HeaderMap {
        let mut merged = self.basic_headers.clone();

        for name in headers.keys() {
            merged.remove(name);
        }

        for (name, value) in headers {
            merged.append(name.clone(), value.clone());
        }

        merged
    }

    /// Header merging step run by every verb before the kwargs updater.
    pub(crate) fn prepare(&self, mut options: RequestOptions) -> RequestOptions {
        options.headers = self.merge_headers(&options.headers);
        options
    }
}

impl fmt::Debug for TransportCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCore")
            .field("base_address", &self.base_address)
            .field("basic_headers", &self.basic_headers)
            .field("kwargs_updater", &self.kwargs_updater.is_some())
            .field("directory_path", &self.directory_path)
            .field("nonce_header", &self.nonce_header)
            .field("peasant", &self.peasant)
            .finish()
    }
}

/// The `newNonce` endpoint advertised by `directory`.
pub(crate) fn new_nonce_url(directory: &Directory) -> Result<&str> {
    directory
        .endpoint(NEW_NONCE)
        .ok_or_else(|| Error::MissingEndpoint(NEW_NONCE.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Peasant;

    /// Bare transport that only provides what the contract requires.
    #[derive(Default)]
    struct Bare {
        peasant: Option<PeasantHandle>,
        updater: Option<KwargsUpdater>,
    }

    impl TransportBase for Bare {
        fn base_address(&self) -> &str {
            "http://bastion"
        }

        fn peasant(&self) -> Option<&PeasantHandle> {
            self.peasant.as_ref()
        }

        fn set_peasant(&mut self, peasant: PeasantHandle) {
            self.peasant = Some(peasant);
        }

        fn kwargs_updater(&self) -> Option<&KwargsUpdater> {
            self.updater.as_ref()
        }
    }

    impl Transport for Bare {}

    #[async_trait]
    impl AsyncTransport for Bare {}

    #[test]
    fn test_update_kwargs_identity() {
        let transport = Bare::default();
        let options = RequestOptions::new().query("a=1").error_for_status(true);

        let updated = transport.update_kwargs(&Method::POST, options);
        assert_eq!(updated.query_string.unwrap().as_str(), "a=1");
        assert!(updated.error_for_status);
        assert!(updated.headers.is_empty());
    }

    #[test]
    fn test_kwargs_updater() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let transport = Bare {
            updater: Some(Arc::new(move |method: &Method, options: RequestOptions| {
                counter.fetch_add(1, Ordering::SeqCst);
                options.header(
                    HeaderName::from_static("test"),
                    HeaderValue::from_str(method.as_str()).unwrap(),
                )
            })),
            ..Default::default()
        };

        let updated = transport.update_kwargs(&Method::POST, RequestOptions::new());
        assert_eq!(updated.headers["test"], "POST");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_url() {
        let transport = Bare::default();
        let options = RequestOptions::new().query("x=1");

        assert_eq!(transport.get_url("/head", &options), "http://bastion/head?x=1");
        assert_eq!(
            transport.get_url("https://elsewhere/dir", &RequestOptions::new()),
            "https://elsewhere/dir"
        );
    }

    #[test]
    fn test_unimplemented_verbs() {
        let transport = Bare::default();

        for result in [
            Transport::get(&transport, "/", RequestOptions::new()),
            Transport::head(&transport, "/", RequestOptions::new()),
            Transport::post(&transport, "/", RequestOptions::new()),
            Transport::put(&transport, "/", RequestOptions::new()),
            Transport::patch(&transport, "/", RequestOptions::new()),
            Transport::delete(&transport, "/", RequestOptions::new()),
            Transport::options(&transport, "/", RequestOptions::new()),
        ] {
            assert!(matches!(result, Err(Error::NotImplemented(_))));
        }

        assert!(matches!(
            Transport::is_registered(&transport),
            Err(Error::NotImplemented("is_registered"))
        ));
    }

    #[test]
    fn test_unimplemented_lifecycle_surfaces_through_peasant() {
        let peasant = Peasant::new(Bare::default());

        assert!(matches!(
            peasant.directory(),
            Err(Error::NotImplemented("set_directory"))
        ));
        assert!(matches!(
            peasant.new_nonce(),
            Err(Error::NotImplemented("new_nonce"))
        ));
    }

    #[tokio::test]
    async fn test_unimplemented_async_verbs() {
        let transport = Bare::default();

        assert!(matches!(
            AsyncTransport::head(&transport, "/", RequestOptions::new()).await,
            Err(Error::NotImplemented("head"))
        ));
        assert!(matches!(
            AsyncTransport::set_directory(&transport).await,
            Err(Error::NotImplemented("set_directory"))
        ));
    }

    #[test]
    fn test_core_rejects_relative_address() {
        assert!(matches!(
            TransportCore::new("bastion/acme", "test/1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_core_rejects_query_and_fragment() {
        for address in ["http://bastion/dir?t=1", "http://bastion/dir#top", "http://bastion?"] {
            assert!(matches!(
                TransportCore::new(address, "test/1"),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_core_normalizes_address() {
        let core = TransportCore::new("http://bastion/acme/", "test/1").unwrap();
        assert_eq!(core.base_address(), "http://bastion/acme");
        assert_eq!(
            core.user_agent(),
            format!("peasant/{} test/1", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_merge_headers() {
        let core = TransportCore::new("http://bastion", "test/1").unwrap();
        let default_agent = core.user_agent().to_owned();

        let mut extra = HeaderMap::new();
        extra.insert(header::USER_AGENT, HeaderValue::from_static("custom/1"));
        extra.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let merged = core.merge_headers(&extra);
        assert_eq!(merged[header::USER_AGENT], "custom/1");
        assert_eq!(merged[header::ACCEPT], "application/json");
        assert_eq!(merged.get_all(header::USER_AGENT).iter().count(), 1);

        // defaults are untouched
        assert_eq!(core.basic_headers()[header::USER_AGENT], default_agent.as_str());

        let untouched = core.merge_headers(&HeaderMap::new());
        assert_eq!(untouched[header::USER_AGENT], default_agent.as_str());
    }

    #[test]
    fn test_new_nonce_url() {
        let directory: Directory =
            serde_json::from_str(r#"{ "newNonce": "http://bastion/acme/new-nonce" }"#).unwrap();
        assert_eq!(
            new_nonce_url(&directory).unwrap(),
            "http://bastion/acme/new-nonce"
        );

        assert!(matches!(
            new_nonce_url(&Directory::default()),
            Err(Error::MissingEndpoint(name)) if name == NEW_NONCE
        ));
    }
}
