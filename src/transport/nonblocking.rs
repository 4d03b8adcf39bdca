use async_trait::async_trait;
use http::{
    header::{self, HeaderName, HeaderValue},
    HeaderMap, Method,
};

use super::{new_nonce_url, AsyncTransport, TransportBase, TransportCore};
use crate::{
    error::{Error, Result},
    options::{KwargsUpdater, RequestOptions},
    peasant::PeasantHandle,
    response::Response,
    Directory,
};

/// Engine name and the release series this crate builds against.
const ENGINE: &str = "reqwest/0.12";

/// Async transport backed by a [`reqwest::Client`].
#[derive(Debug)]
pub struct ReqwestTransport {
    core: TransportCore,
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport for the service at `address` with a default client.
    ///
    /// The address must be an absolute `http(s)` URL; trailing slashes are dropped.
    pub fn new(address: impl AsRef<str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| Error::Config(format!("failed to build HTTP client: {err}")))?;

        Self::with_client(address, client)
    }

    /// Creates a transport that dispatches through a caller-configured client.
    pub fn with_client(address: impl AsRef<str>, client: reqwest::Client) -> Result<Self> {
        Ok(ReqwestTransport {
            core: TransportCore::new(address.as_ref(), ENGINE)?,
            client,
        })
    }

    /// Installs a hook that rewrites the options of every request.
    pub fn with_kwargs_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(&Method, RequestOptions) -> RequestOptions + Send + Sync + 'static,
    {
        self.core.set_kwargs_updater(updater);
        self
    }

    /// Path (or absolute URL) of the directory document. Defaults to the base address itself.
    pub fn with_directory_path(mut self, path: impl Into<String>) -> Self {
        self.core.set_directory_path(path);
        self
    }

    /// Response header carrying fresh nonces. Defaults to `Replay-Nonce`.
    pub fn with_nonce_header(mut self, name: HeaderName) -> Self {
        self.core.set_nonce_header(name);
        self
    }

    /// Adds or replaces a header sent with every request.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.core.set_basic_header(name, value);
        self
    }

    /// `peasant/<version> reqwest/0.12`, unless overridden with
    /// [`with_header()`](Self::with_header).
    pub fn user_agent(&self) -> &str {
        self.core.user_agent()
    }

    pub fn basic_headers(&self) -> &HeaderMap {
        self.core.basic_headers()
    }

    async fn send(&self, method: Method, path: &str, options: RequestOptions) -> Result<Response> {
        let url = self.get_url(path, &options);
        let mut options = self.update_kwargs(&method, self.core.prepare(options));

        if let Some(body) = options.body.take() {
            let (content_type, bytes) = body.encode()?;

            if let Some(content_type) = content_type {
                if !options.headers.contains_key(header::CONTENT_TYPE) {
                    options
                        .headers
                        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
            }

            return self.dispatch(method, url, options, Some(bytes)).await;
        }

        self.dispatch(method, url, options, None).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: String,
        options: RequestOptions,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let mut req = self
            .client
            .request(method.clone(), &url)
            .headers(options.headers);

        if let Some(timeout) = options.timeout {
            req = req.timeout(timeout);
        }

        if let Some(body) = body {
            req = req.body(body);
        }

        log::trace!("{req:?}");

        let res = req.send().await.map_err(Error::http)?;

        let status = res.status();
        let headers = res.headers().clone();
        let url = res.url().to_string();
        let body = res.bytes().await.map_err(Error::http)?.to_vec();

        let res = Response::new(status, headers, body, url);
        log::debug!("{method} {} -> {}", res.url(), res.status());

        if options.error_for_status {
            res.error_for_status()
        } else {
            Ok(res)
        }
    }
}

impl TransportBase for ReqwestTransport {
    fn base_address(&self) -> &str {
        self.core.base_address()
    }

    fn peasant(&self) -> Option<&PeasantHandle> {
        self.core.peasant()
    }

    fn set_peasant(&mut self, peasant: PeasantHandle) {
        self.core.set_peasant(peasant);
    }

    fn kwargs_updater(&self) -> Option<&KwargsUpdater> {
        self.core.kwargs_updater()
    }
}

#[async_trait]
impl AsyncTransport for ReqwestTransport {
    async fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::GET, path, options).await
    }

    async fn head(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::HEAD, path, options).await
    }

    async fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::POST, path, options).await
    }

    async fn put(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::PUT, path, options).await
    }

    async fn patch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::PATCH, path, options).await
    }

    async fn delete(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::DELETE, path, options).await
    }

    async fn options(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::OPTIONS, path, options).await
    }

    async fn set_directory(&self) -> Result<()> {
        let peasant = self.core.attached()?;

        let res = AsyncTransport::get(
            self,
            self.core.directory_path(),
            RequestOptions::new().error_for_status(true),
        )
        .await?;
        let directory = res.json::<Directory>()?;

        peasant.set_directory(directory)?;
        Ok(())
    }

    async fn new_nonce(&self) -> Result<String> {
        let peasant = self.core.attached()?;

        let directory = match peasant.directory() {
            Some(directory) => directory,
            None => {
                AsyncTransport::set_directory(self).await?;
                peasant.directory().ok_or(Error::Detached)?
            }
        };

        log::debug!("Request new nonce");
        let url = new_nonce_url(&directory)?;
        let res = AsyncTransport::head(self, url, RequestOptions::new()).await?;
        res.expect_header(self.core.nonce_header().as_str())
    }
}
