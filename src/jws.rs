//! Signed request bodies carrying the replay nonce.
//!
//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
    error::{Error, Result},
    security::{jose_b64, AccountKey},
};

/// JWT Protected Header scheme as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// resource.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JwsProtectedHeader {
    /// Algorithm. Always `ES256` for keys made by this crate.
    pub alg: String,

    /// The replay nonce, as defined in [RFC 8555 §6.5].
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    pub nonce: String,

    /// The URL this JWS is directed at ([RFC 8555 §6.4]).
    ///
    /// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
    pub url: String,

    /// JSON Web Key. Mutually exclusive with `kid` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,

    /// Key ID. Mutually exclusive with `jwk` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsProtectedHeader {
    fn new_jwk(jwk: Jwk, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            jwk: Some(jwk),
            ..Default::default()
        }
    }

    fn new_kid(kid: &str, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            kid: Some(kid.to_owned()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Jwk {
    alg: String,
    crv: String,
    kty: String,
    #[serde(rename = "use")]
    _use: String,
    x: String,
    y: String,
}

impl Jwk {
    /// [RFC 7638] thumbprint: base64url SHA-256 of the canonical JWK members.
    ///
    /// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn thumbprint(&self) -> Result<String> {
        let canonical = serde_json::to_string(&JwkThumb::from(self))?;
        Ok(jose_b64(&Sha256::digest(canonical.as_bytes())))
    }
}

impl TryFrom<&AccountKey> for Jwk {
    type Error = Error;

    fn try_from(key: &AccountKey) -> Result<Self> {
        let point = key.signing_key().verifying_key().to_encoded_point(false);

        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            return Err(Error::Key("public key is the identity point".to_owned()));
        };

        Ok(Jwk {
            alg: "ES256".to_owned(),
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            _use: "sig".to_owned(),
            x: jose_b64(x),
            y: jose_b64(y),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
// LEXICAL ORDER OF FIELDS MATTER!
struct JwkThumb {
    crv: String,
    kty: String,
    x: String,
    y: String,
}

impl From<&Jwk> for JwkThumb {
    fn from(a: &Jwk) -> Self {
        JwkThumb {
            crv: a.crv.clone(),
            kty: a.kty.clone(),
            x: a.x.clone(),
            y: a.y.clone(),
        }
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

impl FlattenedJsonJws {
    pub fn protected(&self) -> &str {
        &self.protected
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Decodes the protected header.
    ///
    /// Does not verify the signature.
    pub fn protected_header(&self) -> Result<JwsProtectedHeader> {
        let json = BASE64_URL_SAFE_NO_PAD
            .decode(&self.protected)
            .map_err(|err| Error::Key(format!("protected header is not base64url: {err}")))?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// The nonce carried in the protected header.
    pub fn nonce(&self) -> Result<String> {
        Ok(self.protected_header()?.nonce)
    }
}

/// Signs `payload` with the full public key in the protected header.
///
/// Only needed for the first newAccount request.
pub fn sign_with_jwk<T>(
    key: &AccountKey,
    url: &str,
    nonce: String,
    payload: &T,
) -> Result<FlattenedJsonJws>
where
    T: Serialize + ?Sized,
{
    let protected = JwsProtectedHeader::new_jwk(key.jwk()?, url, nonce);
    jws_with(protected, key, payload)
}

/// Signs `payload` referencing the account by its key ID.
pub fn sign_with_kid<T>(
    key: &AccountKey,
    url: &str,
    nonce: String,
    payload: &T,
) -> Result<FlattenedJsonJws>
where
    T: Serialize + ?Sized,
{
    let kid = key
        .key_id()
        .ok_or_else(|| Error::Key("account key has no key ID yet".to_owned()))?;
    let protected = JwsProtectedHeader::new_kid(kid, url, nonce);
    jws_with(protected, key, payload)
}

/// Construct JWS with protected header according to [RFC 7515 §5.1].
///
/// [RFC 7515 §5.1]: https://datatracker.ietf.org/doc/html/rfc7515#section-5.1
fn jws_with<T: Serialize + ?Sized>(
    protected: JwsProtectedHeader,
    key: &AccountKey,
    payload: &T,
) -> Result<FlattenedJsonJws> {
    let protected = jose_b64(&serde_json::to_string(&protected)?);

    let payload = {
        let payload_json = serde_json::to_string(payload)?;

        // POST-as-GET: `api::EmptyString` must stay an empty payload, not `""` encoded
        if payload_json == "\"\"" {
            String::new()
        } else {
            jose_b64(&payload_json)
        }
    };

    let to_sign = format!("{protected}.{payload}");
    let (signature, _rec_id) = key
        .signing_key()
        .sign_recoverable(to_sign.as_bytes())
        .map_err(|err| Error::Key(format!("signing failed: {err}")))?;

    Ok(FlattenedJsonJws {
        protected,
        payload,
        signature: jose_b64(&signature.to_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::{signature::Verifier as _, Signature};
    use serde_json::json;

    use super::*;
    use crate::api::EmptyString;

    fn verify(key: &AccountKey, jws: &FlattenedJsonJws) {
        let signature = BASE64_URL_SAFE_NO_PAD.decode(jws.signature()).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        let signed = format!("{}.{}", jws.protected(), jws.payload());

        key.signing_key()
            .verifying_key()
            .verify(signed.as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn test_sign_with_jwk() {
        let key = AccountKey::generate();
        let payload = json!({ "termsOfServiceAgreed": true });

        let url = "http://bastion/acme/new-acct";
        let jws = sign_with_jwk(&key, url, "n0nce".to_owned(), &payload).unwrap();
        verify(&key, &jws);

        let header = jws.protected_header().unwrap();
        assert_eq!(header.alg, "ES256");
        assert_eq!(header.url, "http://bastion/acme/new-acct");
        assert_eq!(header.jwk, Some(key.jwk().unwrap()));
        assert!(header.kid.is_none());
        assert_eq!(jws.nonce().unwrap(), "n0nce");

        let decoded = BASE64_URL_SAFE_NO_PAD.decode(jws.payload()).unwrap();
        let decoded = serde_json::from_slice::<serde_json::Value>(&decoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_sign_with_kid() {
        let mut key = AccountKey::generate();
        assert!(matches!(
            sign_with_kid(&key, "http://bastion/x", "n".to_owned(), &EmptyString),
            Err(Error::Key(_))
        ));

        key.set_key_id("http://bastion/acme/acct/1".to_owned());
        let jws = sign_with_kid(&key, "http://bastion/x", "n".to_owned(), &EmptyString).unwrap();
        verify(&key, &jws);

        // POST-as-GET keeps an empty payload
        assert_eq!(jws.payload(), "");
        let header = jws.protected_header().unwrap();
        assert_eq!(header.kid.as_deref(), Some("http://bastion/acme/acct/1"));
        assert!(header.jwk.is_none());
    }

    #[test]
    fn test_thumbprint_rfc7638_shape() {
        let key = AccountKey::generate();
        let jwk = key.jwk().unwrap();

        let thumbprint = jwk.thumbprint().unwrap();
        assert_eq!(thumbprint.len(), 43);
        assert_eq!(thumbprint, jwk.thumbprint().unwrap());
        let other = AccountKey::generate().jwk().unwrap();
        assert_ne!(thumbprint, other.thumbprint().unwrap());
    }
}
