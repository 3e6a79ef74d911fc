//! DPoP key material: generation, JWK export/import, thumbprints and signing.
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ecdsa::signature::{Signer, Verifier};
use elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::ThreadRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const KEY_TYPE_EC: &str = "EC";

#[derive(Error, Debug)]
pub enum Error {
    #[error("none of the requested algorithms is supported: {0:?}")]
    UnsupportedAlgorithm(Vec<String>),
    #[error("malformed key: {0}")]
    MalformedKey(String),
    #[error("signature error: {0}")]
    Signature(#[from] ecdsa::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Signature algorithms a [`JoseKey`] can be generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "ES256K")]
    Es256K,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Es256K => "ES256K",
        }
    }
    // https://www.iana.org/assignments/jose/jose.xhtml#web-key-elliptic-curve
    pub fn curve(&self) -> &'static str {
        match self {
            Self::Es256 => "P-256",
            Self::Es256K => "secp256k1",
        }
    }
    fn from_curve(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(Self::Es256),
            "secp256k1" => Some(Self::Es256K),
            _ => None,
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ES256" => Ok(Self::Es256),
            "ES256K" => Ok(Self::Es256K),
            _ => Err(Error::UnsupportedAlgorithm(vec![s.to_string()])),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portable (JWK) form of a DPoP key, as written to and read from stores.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpopJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl fmt::Debug for DpopJwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DpopJwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("d", &self.d.as_ref().map(|_| "[redacted]"))
            .field("alg", &self.alg)
            .field("kid", &self.kid)
            .finish()
    }
}

#[derive(Clone)]
enum Secret {
    Es256(p256::SecretKey),
    Es256K(k256::SecretKey),
}

/// A live DPoP key that can sign payloads.
#[derive(Clone)]
pub struct JoseKey {
    secret: Secret,
    x: String,
    y: String,
    kid: String,
}

impl JoseKey {
    /// Creates a fresh key for the first algorithm in `allowed_algos` that is supported.
    pub fn generate<S>(allowed_algos: &[S]) -> Result<Self>
    where
        S: AsRef<str>,
    {
        for alg in allowed_algos {
            if let Ok(alg) = alg.as_ref().parse::<KeyAlgorithm>() {
                return Ok(Self::random(alg));
            }
        }
        Err(Error::UnsupportedAlgorithm(
            allowed_algos.iter().map(|alg| alg.as_ref().to_string()).collect(),
        ))
    }
    /// Reconstructs a key from its exported form.
    ///
    /// Public-only keys, unknown curves and keys whose public components or `kid`
    /// do not match the private component are rejected.
    pub fn from_jwk(jwk: &DpopJwk) -> Result<Self> {
        if jwk.kty != KEY_TYPE_EC {
            return Err(Error::MalformedKey(format!("unsupported key type: {}", jwk.kty)));
        }
        let Some(alg) = KeyAlgorithm::from_curve(&jwk.crv) else {
            return Err(Error::MalformedKey(format!("unsupported curve: {}", jwk.crv)));
        };
        if let Some(declared) = &jwk.alg {
            if declared != alg.as_str() {
                return Err(Error::MalformedKey(format!(
                    "algorithm {declared} does not match curve {}",
                    jwk.crv
                )));
            }
        }
        let Some(d) = &jwk.d else {
            return Err(Error::MalformedKey(String::from("missing private component `d`")));
        };
        let d = URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|e| Error::MalformedKey(format!("invalid private component: {e}")))?;
        let secret = match alg {
            KeyAlgorithm::Es256 => p256::SecretKey::from_slice(&d).map(Secret::Es256),
            KeyAlgorithm::Es256K => k256::SecretKey::from_slice(&d).map(Secret::Es256K),
        }
        .map_err(|_| Error::MalformedKey(String::from("invalid private scalar")))?;
        let key = Self::from_secret(secret);
        if key.x != jwk.x || key.y != jwk.y {
            return Err(Error::MalformedKey(String::from(
                "public components do not match the private key",
            )));
        }
        if let Some(kid) = &jwk.kid {
            if kid != &key.kid {
                return Err(Error::MalformedKey(format!("kid {kid} does not match thumbprint")));
            }
        }
        Ok(key)
    }
    /// Reconstructs a key from a serialized JWK.
    pub fn from_json(json: &str) -> Result<Self> {
        let jwk = serde_json::from_str::<DpopJwk>(json)
            .map_err(|e| Error::MalformedKey(format!("invalid jwk: {e}")))?;
        Self::from_jwk(&jwk)
    }
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self.secret {
            Secret::Es256(_) => KeyAlgorithm::Es256,
            Secret::Es256K(_) => KeyAlgorithm::Es256K,
        }
    }
    /// RFC 7638 SHA-256 thumbprint of the public key, also used as `kid`.
    pub fn thumbprint(&self) -> &str {
        &self.kid
    }
    /// Exports both private and public components.
    pub fn to_jwk(&self) -> DpopJwk {
        let d = match &self.secret {
            Secret::Es256(secret) => URL_SAFE_NO_PAD.encode(secret.to_bytes()),
            Secret::Es256K(secret) => URL_SAFE_NO_PAD.encode(secret.to_bytes()),
        };
        DpopJwk { d: Some(d), ..self.public_jwk() }
    }
    pub fn public_jwk(&self) -> DpopJwk {
        let alg = self.algorithm();
        DpopJwk {
            kty: String::from(KEY_TYPE_EC),
            crv: String::from(alg.curve()),
            x: self.x.clone(),
            y: self.y.clone(),
            d: None,
            alg: Some(String::from(alg.as_str())),
            kid: Some(self.kid.clone()),
        }
    }
    /// Signs `payload`, returning the JWS (`r || s`) signature bytes.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match &self.secret {
            Secret::Es256(secret) => {
                let signature: p256::ecdsa::Signature =
                    p256::ecdsa::SigningKey::from(secret).sign(payload);
                signature.to_bytes().to_vec()
            }
            Secret::Es256K(secret) => {
                let signature: k256::ecdsa::Signature =
                    k256::ecdsa::SigningKey::from(secret).sign(payload);
                signature.to_bytes().to_vec()
            }
        }
    }
    /// Verifies a JWS signature against this key's public component.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        match &self.secret {
            Secret::Es256(secret) => {
                let signature = p256::ecdsa::Signature::from_slice(signature)?;
                p256::ecdsa::VerifyingKey::from(secret.public_key()).verify(payload, &signature)?;
            }
            Secret::Es256K(secret) => {
                let signature = k256::ecdsa::Signature::from_slice(signature)?;
                k256::ecdsa::VerifyingKey::from(secret.public_key()).verify(payload, &signature)?;
            }
        }
        Ok(())
    }
    fn random(alg: KeyAlgorithm) -> Self {
        let mut rng = ThreadRng::default();
        Self::from_secret(match alg {
            KeyAlgorithm::Es256 => Secret::Es256(p256::SecretKey::random(&mut rng)),
            KeyAlgorithm::Es256K => Secret::Es256K(k256::SecretKey::random(&mut rng)),
        })
    }
    fn from_secret(secret: Secret) -> Self {
        let point = match &secret {
            Secret::Es256(secret) => secret.public_key().to_encoded_point(false).as_bytes().to_vec(),
            Secret::Es256K(secret) => {
                secret.public_key().to_encoded_point(false).as_bytes().to_vec()
            }
        };
        // uncompressed SEC1: 0x04 || x || y
        let (x, y) = point[1..].split_at((point.len() - 1) / 2);
        let (x, y) = (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y));
        let crv = match &secret {
            Secret::Es256(_) => KeyAlgorithm::Es256.curve(),
            Secret::Es256K(_) => KeyAlgorithm::Es256K.curve(),
        };
        // https://datatracker.ietf.org/doc/html/rfc7638#section-3.2
        let canonical = format!(r#"{{"crv":"{crv}","kty":"{KEY_TYPE_EC}","x":"{x}","y":"{y}"}}"#);
        let kid = URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()));
        Self { secret, x, y, kid }
    }
}

impl PartialEq for JoseKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm() == other.algorithm() && self.kid == other.kid
    }
}

impl Eq for JoseKey {}

impl fmt::Debug for JoseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoseKey")
            .field("alg", &self.algorithm())
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}
