//! Account key helpers.

use base64::prelude::*;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use zeroize::Zeroizing;

use crate::{
    error::{Error, Result},
    jws::Jwk,
};

/// Make a P-256 private key (from which we can derive a public key).
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Encodes data with the unpadded base64url alphabet used throughout JOSE.
pub fn jose_b64<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// Key used to sign requests to an ACME-style service.
///
/// Only ECDSA P-256 private keys are supported. RSA keys and public-key PEM documents are
/// rejected by [`from_pem()`](Self::from_pem).
#[derive(Clone, Debug)]
pub struct AccountKey {
    signing_key: p256::ecdsa::SigningKey,

    /// Set once the service has told us our account URL.
    key_id: Option<String>,
}

impl AccountKey {
    pub fn generate() -> AccountKey {
        Self::from_key(create_p256_key())
    }

    pub fn from_pem(pem: &str) -> Result<AccountKey> {
        let signing_key = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(pem)
            .map_err(|err| Error::Key(format!("failed to read PEM: {err}")))?;
        Ok(Self::from_key(signing_key))
    }

    pub fn from_key(signing_key: p256::ecdsa::SigningKey) -> AccountKey {
        AccountKey {
            signing_key,
            key_id: None,
        }
    }

    /// PKCS#8 PEM encoding of the private key.
    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .map_err(|err| Error::Key(format!("failed to write PEM: {err}")))
    }

    pub fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.signing_key
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn set_key_id(&mut self, kid: String) {
        self.key_id = Some(kid)
    }

    /// Public half of the key as a JWK.
    pub fn jwk(&self) -> Result<Jwk> {
        Jwk::try_from(self)
    }
}
