use crate::http_client::dpop::{DpopClient, NonceStore};
use crate::http_client::HttpClient;
use crate::jose_key::JoseKey;
use crate::resolver::{HandleResolver, OAuthResolver};
use crate::types::{
    OAuthAuthorizationServerMetadata, OAuthClientMetadata, OAuthTokenResponse,
    PushedAuthorizationRequestParameters, RefreshRequestParameters, RevocationRequestParameters,
    TokenGrantType, TokenRequestParameters, TokenSet,
};
use chrono::{TimeDelta, Utc};
use http::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no {0} endpoint available")]
    NoEndpoint(String),
    #[error("token response verification failed: {0}")]
    Token(String),
    #[error("unsupported authentication method")]
    UnsupportedAuthMethod,
    #[error("no refresh token available for {0}")]
    NoRefreshToken(String),
    #[error(transparent)]
    DpopClient(#[from] crate::http_client::dpop::Error),
    #[error(transparent)]
    Http(#[from] http::Error),
    #[error("http client error: {0}")]
    HttpClient(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("http status: {0}")]
    HttpStatus(StatusCode),
    #[error("http status: {0}, body: {1:?}")]
    HttpStatusWithBody(StatusCode, Value),
    #[error(transparent)]
    Resolver(#[from] crate::resolver::Error),
    #[error(transparent)]
    SerdeHtmlForm(#[from] serde_html_form::ser::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

pub enum OAuthRequest {
    Token(TokenRequestParameters),
    Refresh(RefreshRequestParameters),
    Revocation(RevocationRequestParameters),
    PushedAuthorizationRequest(PushedAuthorizationRequestParameters),
}

impl OAuthRequest {
    fn name(&self) -> String {
        String::from(match self {
            Self::Token(_) => "token",
            Self::Refresh(_) => "refresh",
            Self::Revocation(_) => "revocation",
            Self::PushedAuthorizationRequest(_) => "pushed_authorization_request",
        })
    }
    fn expected_status(&self) -> StatusCode {
        match self {
            Self::Token(_) | Self::Refresh(_) | Self::Revocation(_) => StatusCode::OK,
            Self::PushedAuthorizationRequest(_) => StatusCode::CREATED,
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestPayload<'a, T>
where
    T: Serialize,
{
    client_id: &'a str,
    #[serde(flatten)]
    parameters: &'a T,
}

/// Talks to one authorization server with one DPoP key.
pub struct OAuthServerAgent<T, H>
where
    T: HttpClient + Send + Sync + 'static,
{
    server_metadata: OAuthAuthorizationServerMetadata,
    client_metadata: OAuthClientMetadata,
    dpop_client: DpopClient<T>,
    resolver: Arc<OAuthResolver<T, H>>,
}

impl<T, H> OAuthServerAgent<T, H>
where
    T: HttpClient + Send + Sync + 'static,
    H: HandleResolver + Send + Sync + 'static,
{
    pub fn new(
        dpop_key: JoseKey,
        server_metadata: OAuthAuthorizationServerMetadata,
        client_metadata: OAuthClientMetadata,
        resolver: Arc<OAuthResolver<T, H>>,
        http_client: Arc<T>,
        nonces: NonceStore,
    ) -> Result<Self> {
        let dpop_client = DpopClient::new(
            dpop_key,
            http_client,
            nonces,
            true,
            &server_metadata.dpop_signing_alg_values_supported,
        )?;
        Ok(Self { server_metadata, client_metadata, dpop_client, resolver })
    }
    /**
     * Always call this to process token responses.
     *
     * The "sub" must be a DID whose authorization server is the one the
     * credentials were just obtained from; only then can it be used as the
     * user's identifier.
     */
    async fn verify_token_response(&self, token_response: OAuthTokenResponse) -> Result<TokenSet> {
        // ATPROTO requires that the "sub" is always present in the token response.
        let Some(sub) = &token_response.sub else {
            self.revoke(&token_response.access_token).await;
            return Err(Error::Token("missing `sub` in token response".into()));
        };
        let (metadata, identity) = match self.resolver.resolve(sub).await {
            Ok((metadata, Some(identity))) => (metadata, identity),
            Ok((_, None)) => return Err(Error::Token(format!("invalid `sub`: {sub}"))),
            Err(e) => {
                self.revoke(&token_response.access_token).await;
                return Err(e.into());
            }
        };
        if metadata.issuer != self.server_metadata.issuer {
            self.revoke(&token_response.access_token).await;
            return Err(Error::Token("issuer mismatch".into()));
        }
        let expires_at = token_response
            .expires_in
            .and_then(|expires_in| Utc::now().checked_add_signed(TimeDelta::seconds(expires_in)));
        Ok(TokenSet {
            iss: metadata.issuer,
            sub: identity.did,
            aud: identity.pds,
            scope: token_response.scope,
            refresh_token: token_response.refresh_token,
            access_token: token_response.access_token,
            token_type: token_response.token_type,
            expires_at,
        })
    }
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        self.verify_token_response(
            self.request(OAuthRequest::Token(TokenRequestParameters {
                grant_type: TokenGrantType::AuthorizationCode,
                code: code.into(),
                redirect_uri: redirect_uri.into(),
                code_verifier: verifier.into(),
            }))
            .await?,
        )
        .await
    }
    /// Best-effort: failures are logged and ignored.
    pub async fn revoke(&self, token: &str) {
        let request =
            OAuthRequest::Revocation(RevocationRequestParameters { token: token.into() });
        if let Err(e) = self.send(&request).await {
            tracing::debug!(error = %e, "token revocation failed");
        }
    }
    pub async fn refresh(&self, token_set: &TokenSet) -> Result<TokenSet> {
        let Some(refresh_token) = token_set.refresh_token.as_ref() else {
            return Err(Error::NoRefreshToken(token_set.sub.clone()));
        };
        let refreshed = self
            .verify_token_response(
                self.request::<OAuthTokenResponse>(OAuthRequest::Refresh(
                    RefreshRequestParameters {
                        grant_type: TokenGrantType::RefreshToken,
                        refresh_token: refresh_token.clone(),
                        scope: None,
                    },
                ))
                .await?,
            )
            .await?;
        if refreshed.sub != token_set.sub {
            return Err(Error::Token(format!(
                "`sub` changed from {} to {}",
                token_set.sub, refreshed.sub
            )));
        }
        Ok(refreshed)
    }
    pub async fn request<O>(&self, request: OAuthRequest) -> Result<O>
    where
        O: serde::de::DeserializeOwned,
    {
        let res = self.send(&request).await?;
        Ok(serde_json::from_slice(res.body())?)
    }
    async fn send(&self, request: &OAuthRequest) -> Result<Response<Vec<u8>>> {
        let Some(url) = self.endpoint(request) else {
            return Err(Error::NoEndpoint(request.name()));
        };
        self.check_auth_method()?;
        let body = match request {
            OAuthRequest::Token(params) => self.build_body(params)?,
            OAuthRequest::Refresh(params) => self.build_body(params)?,
            OAuthRequest::Revocation(params) => self.build_body(params)?,
            OAuthRequest::PushedAuthorizationRequest(params) => self.build_body(params)?,
        };
        let req = Request::builder()
            .uri(url)
            .method(Method::POST)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.into_bytes())?;
        tracing::debug!(request = %request.name(), url = %url, "sending oauth request");
        let res = self.dpop_client.send_http(req).await.map_err(Error::HttpClient)?;
        if res.status() == request.expected_status() {
            Ok(res)
        } else if res.status().is_client_error() {
            let body = serde_json::from_slice(res.body()).unwrap_or_default();
            Err(Error::HttpStatusWithBody(res.status(), body))
        } else {
            Err(Error::HttpStatus(res.status()))
        }
    }
    fn build_body<S>(&self, parameters: &S) -> Result<String>
    where
        S: Serialize,
    {
        Ok(serde_html_form::to_string(RequestPayload {
            client_id: &self.client_metadata.client_id,
            parameters,
        })?)
    }
    // Only public clients (`none`) are supported.
    fn check_auth_method(&self) -> Result<()> {
        let method_supported = &self.server_metadata.token_endpoint_auth_methods_supported;
        match self.client_metadata.token_endpoint_auth_method.as_deref() {
            None | Some("none")
                if method_supported
                    .as_ref()
                    .is_some_and(|v| v.iter().any(|method| method == "none")) =>
            {
                Ok(())
            }
            _ => Err(Error::UnsupportedAuthMethod),
        }
    }
    fn endpoint(&self, request: &OAuthRequest) -> Option<&String> {
        match request {
            OAuthRequest::Token(_) | OAuthRequest::Refresh(_) => {
                Some(&self.server_metadata.token_endpoint)
            }
            OAuthRequest::Revocation(_) => self.server_metadata.revocation_endpoint.as_ref(),
            OAuthRequest::PushedAuthorizationRequest(_) => {
                self.server_metadata.pushed_authorization_request_endpoint.as_ref()
            }
        }
    }
}
