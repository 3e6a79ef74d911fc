use super::HttpClient;
use crate::jose::create_signed_jwt;
use crate::jose::jws::RegisteredHeader;
use crate::jose::jwt::{Claims, PublicClaims, RegisteredClaims};
use crate::jose_key::JoseKey;
use crate::store::memory::MemoryStore;
use crate::store::Store;
use crate::utils::generate_nonce;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use http::{Request, Response};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

const JWT_HEADER_TYP_DPOP: &str = "dpop+jwt";

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("key does not match any alg supported by the server")]
    UnsupportedKey,
    #[error("request uri has no authority: {0}")]
    NoAuthority(String),
    #[error("nonce store error: {0}")]
    Nonces(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

type Result<T> = core::result::Result<T, Error>;

/// Nonces last seen per authority (`host:port`), shared between clients.
pub type NonceStore = MemoryStore<String, String>;

/// Wraps an [`HttpClient`] and attaches a DPoP proof signed by `key` to each request.
pub struct DpopClient<T, S = NonceStore>
where
    S: Store<String, String>,
{
    inner: Arc<T>,
    key: JoseKey,
    nonces: S,
    is_auth_server: bool,
}

impl<T, S> DpopClient<T, S>
where
    S: Store<String, String>,
{
    pub fn new(
        key: JoseKey,
        http_client: Arc<T>,
        nonces: S,
        is_auth_server: bool,
        supported_algs: &Option<Vec<String>>,
    ) -> Result<Self> {
        if let Some(algs) = supported_algs {
            if !algs.iter().any(|alg| alg == key.algorithm().as_str()) {
                return Err(Error::UnsupportedKey);
            }
        }
        Ok(Self { inner: http_client, key, nonces, is_auth_server })
    }
    pub fn key(&self) -> &JoseKey {
        &self.key
    }
    fn build_proof(
        &self,
        htm: String,
        htu: String,
        ath: Option<String>,
        nonce: Option<String>,
    ) -> Result<String> {
        let mut header = RegisteredHeader::from(self.key.algorithm());
        header.typ = Some(JWT_HEADER_TYP_DPOP.into());
        header.jwk = Some(self.key.public_jwk());
        let claims = Claims {
            registered: RegisteredClaims {
                jti: Some(generate_nonce()),
                iat: Some(Utc::now().timestamp()),
                ..Default::default()
            },
            public: PublicClaims { htm: Some(htm), htu: Some(htu), ath, nonce },
        };
        Ok(create_signed_jwt(&self.key, header.into(), claims)?)
    }
    fn is_use_dpop_nonce_error(&self, response: &Response<Vec<u8>>) -> bool {
        // https://datatracker.ietf.org/doc/html/rfc9449#name-authorization-server-provid
        if self.is_auth_server {
            if response.status() == 400 {
                if let Ok(res) = serde_json::from_slice::<ErrorResponse>(response.body()) {
                    return res.error == "use_dpop_nonce";
                };
            }
        }
        // https://datatracker.ietf.org/doc/html/rfc9449#name-resource-server-provided-no
        else if response.status() == 401 {
            if let Some(www_auth) =
                response.headers().get("WWW-Authenticate").and_then(|v| v.to_str().ok())
            {
                return www_auth.starts_with("DPoP")
                    && www_auth.contains(r#"error="use_dpop_nonce""#);
            }
        }
        false
    }
}

impl<T, S> HttpClient for DpopClient<T, S>
where
    T: HttpClient + Send + Sync + 'static,
    S: Store<String, String> + Send + Sync + 'static,
{
    async fn send_http(
        &self,
        mut request: Request<Vec<u8>>,
    ) -> core::result::Result<Response<Vec<u8>>, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        let uri = request.uri();
        let nonce_key = uri
            .authority()
            .ok_or_else(|| Error::NoAuthority(uri.to_string()))?
            .to_string();
        let htm = request.method().to_string();
        let htu = uri.to_string();

        let ath = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("DPoP "))
            .map(|token| URL_SAFE_NO_PAD.encode(Sha256::digest(token)));

        let init_nonce =
            self.nonces.get(&nonce_key).await.map_err(|e| Error::Nonces(Box::new(e)))?;
        let init_proof =
            self.build_proof(htm.clone(), htu.clone(), ath.clone(), init_nonce.clone())?;
        request.headers_mut().insert("DPoP", init_proof.parse()?);
        let response = self.inner.send_http(request.clone()).await?;

        let next_nonce =
            response.headers().get("DPoP-Nonce").and_then(|v| v.to_str().ok()).map(String::from);
        match &next_nonce {
            Some(s) if next_nonce != init_nonce => {
                self.nonces
                    .set(nonce_key.clone(), s.clone())
                    .await
                    .map_err(|e| Error::Nonces(Box::new(e)))?;
            }
            _ => {
                // nothing new to retry with
                return Ok(response);
            }
        }

        if !self.is_use_dpop_nonce_error(&response) {
            return Ok(response);
        }
        tracing::debug!(authority = %nonce_key, "retrying with a fresh dpop nonce");
        let next_proof = self.build_proof(htm, htu, ath, next_nonce)?;
        request.headers_mut().insert("DPoP", next_proof.parse()?);
        let response = self.inner.send_http(request).await?;
        Ok(response)
    }
}
