use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
///
/// Usable wherever a transport expects a base address.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

impl AsRef<str> for DirectoryUrl<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Server-advertised map of capability names to endpoints.
///
/// This is the value a client caches after its first directory lookup. Values are kept as raw
/// JSON so that non-ACME services can advertise whatever they like; use [`decode()`] to get the
/// typed [`api::Directory`].
///
/// [`decode()`]: Directory::decode()
/// [`api::Directory`]: crate::api::Directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directory(Map<String, Value>);

impl Directory {
    /// Returns the endpoint URL advertised under `name`, if it is a string.
    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `meta` object, if advertised.
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.0.get("meta").and_then(Value::as_object)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the directory into a typed representation.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

impl From<Map<String, Value>> for Directory {
    fn from(map: Map<String, Value>) -> Self {
        Directory(map)
    }
}
