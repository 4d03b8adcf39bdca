//! Transport layer for clients of ACME-style REST services.
//!
//! Such services advertise their endpoints in a directory document and protect state-changing
//! requests with single-use nonces. This crate provides the plumbing every client of them needs:
//!
//! - [`compose_url()`] builds request URLs from a base address, a path and a query string;
//! - [`Transport`] and [`AsyncTransport`] describe an HTTP engine binding, with
//!   [`UreqTransport`] (blocking) and [`ReqwestTransport`] (async) bundled;
//! - [`Peasant`] and [`AsyncPeasant`] fetch the directory once, cache it, and hand out fresh
//!   nonces;
//! - the [`server`] module enforces nonces on the serving side.
//!
//! # Usage
//!
//! ```no_run
//! # #[cfg(feature = "ureq")]
//! # fn main() -> peasant::Result<()> {
//! use peasant::{DirectoryUrl, Peasant, UreqTransport};
//!
//! let client = Peasant::new(UreqTransport::new(DirectoryUrl::LetsEncryptStaging)?);
//!
//! let directory = client.directory()?.expect("directory is populated");
//! println!("new nonces at {:?}", directory.endpoint("newNonce"));
//! println!("nonce: {}", client.new_nonce()?);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ureq"))]
//! # fn main() {}
//! ```
//!
//! # Engines
//!
//! Bundled transports are selected at build time:
//!
//! - `ureq`: [`UreqTransport`], blocking;
//! - `reqwest`: [`ReqwestTransport`], async;
//! - `rustls`: HTTPS support for whichever engines are enabled.
//!
//! All are enabled by default. Other engines can be plugged in by implementing [`Transport`] or
//! [`AsyncTransport`].

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod dir;
mod error;
mod options;
mod peasant;
mod response;
mod url;

pub mod api;
pub mod jws;
pub mod security;
pub mod server;
pub mod transport;


#[cfg(feature = "reqwest")]
pub use crate::transport::ReqwestTransport;
#[cfg(feature = "ureq")]
pub use crate::transport::UreqTransport;
pub use crate::{
    dir::{Directory, DirectoryUrl},
    error::{Error, Result},
    options::{Body, KwargsUpdater, RequestOptions},
    peasant::{AsyncPeasant, Peasant, PeasantHandle},
    response::Response,
    security::AccountKey,
    transport::{AsyncTransport, Transport, TransportBase},
    url::{compose_url, normalize_base, QueryString},
};
