//! Server-side replay protection.
//!
//! A [`NonceService`] knows how to find the nonce in a request and whether it is still good.
//! [`nonced()`] and [`nonced_async()`] wrap a request handler so that it only runs for requests
//! carrying a fresh nonce.

use std::{
    collections::{HashSet, VecDeque},
    future::Future,
};

use parking_lot::Mutex;
use rand::Rng as _;

use crate::security::jose_b64;

/// Nonces kept by a [`NonceRegistry`] before the oldest ones are evicted.
pub const DEFAULT_CAPACITY: usize = 256;

/// Nonce bookkeeping for a server framework's request type.
pub trait NonceService {
    /// Framework request type.
    type Request: ?Sized;

    /// What a handler produces.
    type Response;

    /// Marks `nonce` as used.
    ///
    /// Returns `Some` with a token only if the nonce was valid and not used before.
    fn consume(&self, request: &Self::Request, nonce: &str) -> Option<String>;

    /// Releases bookkeeping for a nonce consumed by a completed request.
    fn clear(&self, request: &Self::Request, nonce: &str);

    /// Response for a request that carries no nonce at all.
    fn block_request(&self, request: &Self::Request) -> Self::Response;

    /// Response for a request whose nonce is unknown or already used.
    ///
    /// ACME services answer with a `badNonce` problem and status 400; see
    /// [`Problem::bad_nonce()`](crate::api::Problem::bad_nonce).
    fn reject_nonce(&self, request: &Self::Request, nonce: &str) -> Self::Response;

    /// Extracts the nonce from the request, usually from a header.
    fn from_request(&self, request: &Self::Request) -> Option<String>;

    /// Whether the request carries a nonce.
    fn provided(&self, request: &Self::Request) -> bool {
        self.from_request(request).is_some()
    }
}

/// Runs `handler` only when `request` carries a fresh nonce.
///
/// - no nonce: [`NonceService::block_request`], handler not called
/// - fresh nonce: handler, then [`NonceService::clear`]
/// - unknown or reused nonce: [`NonceService::reject_nonce`], handler not called
pub fn nonced<S, F>(service: &S, request: &S::Request, handler: F) -> S::Response
where
    S: NonceService + ?Sized,
    F: FnOnce(&S::Request) -> S::Response,
{
    let nonce = match nonce_of(service, request) {
        Some(nonce) => nonce,
        None => return service.block_request(request),
    };

    match service.consume(request, &nonce) {
        Some(_token) => {
            let res = handler(request);
            service.clear(request, &nonce);
            res
        }
        None => {
            log::debug!("Rejecting request with stale nonce");
            service.reject_nonce(request, &nonce)
        }
    }
}

/// Async version of [`nonced()`].
///
/// The handler future is only created once the nonce has been consumed.
pub async fn nonced_async<S, F, Fut>(service: &S, request: &S::Request, handler: F) -> S::Response
where
    S: NonceService + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = S::Response>,
{
    let nonce = match nonce_of(service, request) {
        Some(nonce) => nonce,
        None => return service.block_request(request),
    };

    match service.consume(request, &nonce) {
        Some(_token) => {
            let res = handler().await;
            service.clear(request, &nonce);
            res
        }
        None => {
            log::debug!("Rejecting request with stale nonce");
            service.reject_nonce(request, &nonce)
        }
    }
}

fn nonce_of<S>(service: &S, request: &S::Request) -> Option<String>
where
    S: NonceService + ?Sized,
{
    if !service.provided(request) {
        log::debug!("Blocking request without nonce");
        return None;
    }

    service.from_request(request)
}

/// In-memory store of issued nonces.
///
/// Each nonce can be consumed once. Only the most recent `capacity` unconsumed nonces are kept.
#[derive(Debug)]
pub struct NonceRegistry {
    capacity: usize,
    inner: Mutex<Nonces>,
}

#[derive(Debug, Default)]
struct Nonces {
    outstanding: VecDeque<String>,
    in_use: HashSet<String>,
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "nonce registry capacity must be positive");

        NonceRegistry {
            capacity,
            inner: Mutex::default(),
        }
    }

    /// Mints a new 128-bit nonce, base64url encoded.
    pub fn issue(&self) -> String {
        let mut bytes = [0_u8; 16];
        rand::thread_rng().fill(&mut bytes);
        let nonce = jose_b64(&bytes);

        let mut inner = self.inner.lock();
        inner.outstanding.push_back(nonce.clone());

        if inner.outstanding.len() > self.capacity {
            log::trace!("Evicting oldest nonce");
            inner.outstanding.pop_front();
        }

        nonce
    }

    /// Marks `nonce` as in use. `None` if it was never issued, was evicted or was already used.
    pub fn consume(&self, nonce: &str) -> Option<String> {
        let mut inner = self.inner.lock();

        let idx = inner.outstanding.iter().position(|issued| issued == nonce)?;
        let nonce = inner.outstanding.remove(idx)?;
        inner.in_use.insert(nonce.clone());

        Some(nonce)
    }

    /// Forgets a consumed nonce once its request has been handled.
    pub fn clear(&self, nonce: &str) {
        self.inner.lock().in_use.remove(nonce);
    }

    /// Number of issued nonces not yet consumed.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding.len()
    }

    /// Number of consumed nonces whose requests are still being handled.
    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use.len()
    }
}
