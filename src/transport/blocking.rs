use std::{io::Read as _, time::Duration};

use http::{
    header::{self, HeaderName, HeaderValue},
    HeaderMap, Method, StatusCode,
};

use super::{new_nonce_url, Transport, TransportBase, TransportCore};
use crate::{
    error::{Error, Result},
    options::{KwargsUpdater, RequestOptions},
    peasant::PeasantHandle,
    response::Response,
    Directory,
};

/// Engine name and the major release series this crate builds against.
const ENGINE: &str = "ureq/2";

/// Blocking transport backed by a [`ureq::Agent`].
///
/// Every verb blocks the calling thread until the response body has been read.
///
/// ureq keeps a single value per request header, so repeated values of one header are sent
/// joined with `, `. Values that are not visible ASCII are dropped with a warning.
#[derive(Debug)]
pub struct UreqTransport {
    core: TransportCore,
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Creates a transport for the service at `address` with a default agent.
    ///
    /// The address must be an absolute `http(s)` URL; trailing slashes are dropped.
    pub fn new(address: impl AsRef<str>) -> Result<Self> {
        Self::with_agent(address, default_agent())
    }

    /// Creates a transport that dispatches through a caller-configured agent.
    pub fn with_agent(address: impl AsRef<str>, agent: ureq::Agent) -> Result<Self> {
        Ok(UreqTransport {
            core: TransportCore::new(address.as_ref(), ENGINE)?,
            agent,
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

    /// `peasant/<version> ureq/2`, unless overridden with [`with_header()`](Self::with_header).
    pub fn user_agent(&self) -> &str {
        self.core.user_agent()
    }

    pub fn basic_headers(&self) -> &HeaderMap {
        self.core.basic_headers()
    }

    fn send(&self, method: Method, path: &str, options: RequestOptions) -> Result<Response> {
        let url = self.get_url(path, &options);
        let options = self.update_kwargs(&method, self.core.prepare(options));

        let mut req = self.agent.request(method.as_str(), &url);

        for name in options.headers.keys() {
            let values = options
                .headers
                .get_all(name)
                .iter()
                .filter_map(|value| match value.to_str() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        log::warn!("Skipping non-ASCII value of header {name}");
                        None
                    }
                })
                .collect::<Vec<_>>();

            if !values.is_empty() {
                req = req.set(name.as_str(), &values.join(", "));
            }
        }

        if let Some(timeout) = options.timeout {
            req = req.timeout(timeout);
        }

        log::trace!("{req:?}");

        let res = match options.body {
            Some(body) => {
                let (content_type, bytes) = body.encode()?;

                if let Some(content_type) = content_type {
                    if !options.headers.contains_key(header::CONTENT_TYPE) {
                        req = req.set(header::CONTENT_TYPE.as_str(), content_type);
                    }
                }

                req.send_bytes(&bytes)
            }
            None => req.call(),
        };

        let res = match res {
            Ok(res) | Err(ureq::Error::Status(_, res)) => res,
            Err(err) => return Err(Error::http(err)),
        };

        let res = into_response(res, url)?;
        log::debug!("{method} {} -> {}", res.url(), res.status());

        if options.error_for_status {
            res.error_for_status()
        } else {
            Ok(res)
        }
    }
}

impl TransportBase for UreqTransport {
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

impl Transport for UreqTransport {
    fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::GET, path, options)
    }

    fn head(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::HEAD, path, options)
    }

    fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::POST, path, options)
    }

    fn put(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::PUT, path, options)
    }

    fn patch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::PATCH, path, options)
    }

    fn delete(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::DELETE, path, options)
    }

    fn options(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(Method::OPTIONS, path, options)
    }

    fn set_directory(&self) -> Result<()> {
        let peasant = self.core.attached()?;

        let res = self.get(
            self.core.directory_path(),
            RequestOptions::new().error_for_status(true),
        )?;
        let directory = res.json::<Directory>()?;

        peasant.set_directory(directory)?;
        Ok(())
    }

    fn new_nonce(&self) -> Result<String> {
        let peasant = self.core.attached()?;

        let directory = match peasant.directory() {
            Some(directory) => directory,
            None => {
                self.set_directory()?;
                peasant.directory().ok_or(Error::Detached)?
            }
        };

        log::debug!("Request new nonce");
        let res = self.head(new_nonce_url(&directory)?, RequestOptions::new())?;
        res.expect_header(self.core.nonce_header().as_str())
    }
}

fn default_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(30))
        .timeout_read(Duration::from_secs(30))
        .timeout_write(Duration::from_secs(30))
        .build()
}

fn into_response(res: ureq::Response, requested: String) -> Result<Response> {
    let status = StatusCode::from_u16(res.status()).map_err(Error::http)?;
    let url = if res.get_url().is_empty() {
        requested
    } else {
        res.get_url().to_owned()
    };

    let mut headers = HeaderMap::new();
    for name in res.headers_names() {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };

        for value in res.all(name.as_str()) {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|len| len.to_str().ok())
        .and_then(|len| len.parse::<usize>().ok());

    let mut body = Vec::new();
    if let Err(err) = res.into_reader().read_to_end(&mut body) {
        // some servers close the TLS stream abruptly after sending the whole body
        if !content_length.is_some_and(|len| body.len() >= len) {
            return Err(Error::http(err));
        }

        log::debug!("Ignoring error after reading {} body bytes: {err}", body.len());
    }

    Ok(Response::new(status, headers, body, url))
}
