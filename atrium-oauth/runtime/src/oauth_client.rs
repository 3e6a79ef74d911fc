use crate::error::{Error, Result};
use crate::http_client::dpop::NonceStore;
use crate::http_client::HttpClient;
use crate::jose_key::JoseKey;
use crate::resolver::{
    AtprotoHandleResolver, AtprotoHandleResolverConfig, HandleResolver, HickoryDnsTxtResolver,
    OAuthResolver, OAuthResolverConfig, DEFAULT_PLC_DIRECTORY_URL,
};
use crate::runtime::{LocalLock, Runtime, RuntimeLock};
use crate::server_agent::{OAuthRequest, OAuthServerAgent};
use crate::store::session::{SavedSession, Session};
use crate::store::state::{InternalStateData, SavedState};
use crate::store::{to_dpop_key_store, DpopKeyStore, Store};
use crate::types::{
    AuthorizationCodeChallengeMethod, AuthorizationResponseMode, AuthorizationResponseType,
    AuthorizeOptions, CallbackParams, OAuthAuthorizationServerMetadata, OAuthClientMetadata,
    OAuthPusehedAuthorizationRequestResponse, PushedAuthorizationRequestParameters,
    TryIntoOAuthClientMetadata,
};
use crate::utils::compare_algos;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use http::{Request, StatusCode};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

// https://datatracker.ietf.org/doc/html/rfc7518#section-3.1
const FALLBACK_ALG: &str = "ES256";

pub struct OAuthClientConfig<S0, S1, M, T, L = LocalLock> {
    // Config
    pub client_metadata: M,
    pub response_mode: AuthorizationResponseMode,
    // Stores
    pub state_store: S0,
    pub session_store: S1,
    // Services
    pub http_client: T,
    /// Nameservers queried when the system DNS cannot resolve a handle.
    pub fallback_nameservers: Option<Vec<IpAddr>>,
    pub plc_directory_url: Option<String>,
    // Runtime
    pub request_lock: Option<L>,
}

/// An atproto OAuth client for public (`token_endpoint_auth_method: none`) clients.
///
/// Authorization states and sessions are persisted through [`DpopKeyStore`]s,
/// so the DPoP key bound to each record survives every read and write.
#[cfg(feature = "default-client")]
pub struct AtprotoOAuthClient<
    S0,
    S1,
    T = crate::http_client::DefaultHttpClient,
    H = AtprotoHandleResolver<HickoryDnsTxtResolver, T>,
    L = LocalLock,
> {
    pub client_metadata: OAuthClientMetadata,
    response_mode: AuthorizationResponseMode,
    resolver: Arc<OAuthResolver<T, H>>,
    runtime: Runtime<L>,
    state_store: DpopKeyStore<S0, InternalStateData<JoseKey>>,
    session_store: DpopKeyStore<S1, Session<JoseKey>>,
    http_client: Arc<T>,
    nonces: NonceStore,
}

#[cfg(not(feature = "default-client"))]
pub struct AtprotoOAuthClient<
    S0,
    S1,
    T,
    H = AtprotoHandleResolver<HickoryDnsTxtResolver, T>,
    L = LocalLock,
> {
    pub client_metadata: OAuthClientMetadata,
    response_mode: AuthorizationResponseMode,
    resolver: Arc<OAuthResolver<T, H>>,
    runtime: Runtime<L>,
    state_store: DpopKeyStore<S0, InternalStateData<JoseKey>>,
    session_store: DpopKeyStore<S1, Session<JoseKey>>,
    http_client: Arc<T>,
    nonces: NonceStore,
}

impl<S0, S1, T, L>
    AtprotoOAuthClient<S0, S1, T, AtprotoHandleResolver<HickoryDnsTxtResolver, T>, L>
where
    T: HttpClient + Send + Sync + 'static,
{
    /// Creates a client whose handle resolver uses DNS (falling back to
    /// `fallback_nameservers`) and then the HTTPS well-known endpoint.
    pub fn new<M>(config: OAuthClientConfig<S0, S1, M, T, L>) -> Result<Self>
    where
        M: TryIntoOAuthClientMetadata<Error = crate::atproto::Error>,
    {
        let http_client = Arc::new(config.http_client);
        let handle_resolver = AtprotoHandleResolver::new(AtprotoHandleResolverConfig {
            dns_txt_resolver: HickoryDnsTxtResolver::new(config.fallback_nameservers.as_deref()),
            http_client: http_client.clone(),
        });
        Self::build(
            OAuthClientConfig {
                client_metadata: config.client_metadata,
                response_mode: config.response_mode,
                state_store: config.state_store,
                session_store: config.session_store,
                http_client,
                fallback_nameservers: None,
                plc_directory_url: config.plc_directory_url,
                request_lock: config.request_lock,
            },
            handle_resolver,
        )
    }
    /// Fetches the client metadata document published at `client_id`, then creates the client.
    pub async fn from_client_id(
        client_id: &str,
        config: OAuthClientConfig<S0, S1, (), T, L>,
    ) -> Result<Self> {
        let client_metadata = fetch_client_metadata(&config.http_client, client_id).await?;
        Self::new(OAuthClientConfig {
            client_metadata,
            response_mode: config.response_mode,
            state_store: config.state_store,
            session_store: config.session_store,
            http_client: config.http_client,
            fallback_nameservers: config.fallback_nameservers,
            plc_directory_url: config.plc_directory_url,
            request_lock: config.request_lock,
        })
    }
}

impl<S0, S1, T, H, L> AtprotoOAuthClient<S0, S1, T, H, L>
where
    T: HttpClient + Send + Sync + 'static,
{
    /// Creates a client with a caller-supplied handle resolver.
    /// `fallback_nameservers` is not used in this case.
    pub fn with_handle_resolver<M>(
        config: OAuthClientConfig<S0, S1, M, T, L>,
        handle_resolver: H,
    ) -> Result<Self>
    where
        M: TryIntoOAuthClientMetadata<Error = crate::atproto::Error>,
    {
        let OAuthClientConfig {
            client_metadata,
            response_mode,
            state_store,
            session_store,
            http_client,
            fallback_nameservers: _,
            plc_directory_url,
            request_lock,
        } = config;
        Self::build(
            OAuthClientConfig {
                client_metadata,
                response_mode,
                state_store,
                session_store,
                http_client: Arc::new(http_client),
                fallback_nameservers: None,
                plc_directory_url,
                request_lock,
            },
            handle_resolver,
        )
    }
    fn build<M>(
        config: OAuthClientConfig<S0, S1, M, Arc<T>, L>,
        handle_resolver: H,
    ) -> Result<Self>
    where
        M: TryIntoOAuthClientMetadata<Error = crate::atproto::Error>,
    {
        if config.response_mode == AuthorizationResponseMode::Fragment {
            return Err(Error::ResponseMode(config.response_mode));
        }
        let client_metadata = config.client_metadata.try_into_client_metadata()?;
        let http_client = config.http_client;
        let resolver = OAuthResolver::new(OAuthResolverConfig {
            http_client: http_client.clone(),
            handle_resolver,
            plc_directory_url: config
                .plc_directory_url
                .unwrap_or_else(|| String::from(DEFAULT_PLC_DIRECTORY_URL)),
        });
        Ok(Self {
            client_metadata,
            response_mode: config.response_mode,
            resolver: Arc::new(resolver),
            runtime: Runtime::new(config.request_lock),
            state_store: to_dpop_key_store(config.state_store),
            session_store: to_dpop_key_store(config.session_store),
            http_client,
            nonces: NonceStore::default(),
        })
    }
}

impl<S0, S1, T, H, L> AtprotoOAuthClient<S0, S1, T, H, L>
where
    S0: Store<String, SavedState> + Sync,
    S1: Store<String, SavedSession> + Sync,
    T: HttpClient + Send + Sync + 'static,
    H: HandleResolver + Send + Sync + 'static,
    L: RuntimeLock + Sync,
{
    /// Starts an authorization for a handle, DID or PDS/entryway URL and
    /// returns the URL the user should be sent to.
    pub async fn authorize(
        &self,
        input: impl AsRef<str>,
        options: AuthorizeOptions,
    ) -> Result<String> {
        let redirect_uri = match options.redirect_uri {
            Some(uri) if self.client_metadata.redirect_uris.contains(&uri) => uri,
            Some(uri) => return Err(Error::Authorize(format!("invalid redirect_uri: {uri}"))),
            None => self
                .default_redirect_uri()
                .ok_or_else(|| Error::Authorize("no redirect_uri available".into()))?
                .clone(),
        };
        let (metadata, identity) = self.resolver.resolve(input.as_ref()).await?;
        let mut algs =
            metadata.dpop_signing_alg_values_supported.clone().unwrap_or(vec![FALLBACK_ALG.into()]);
        algs.sort_by(compare_algos);
        let dpop_key = self.runtime.create_key(&algs)?;
        let (code_challenge, verifier) = self.generate_pkce()?;
        let state = URL_SAFE_NO_PAD.encode(self.runtime.get_random_values(16));
        let state_data = InternalStateData {
            iss: metadata.issuer.clone(),
            state: state.clone(),
            verifier,
            dpop_key: Some(dpop_key.clone()),
            app_state: options.state,
            redirect_uri: Some(redirect_uri.clone())
                .filter(|uri| Some(uri) != self.default_redirect_uri()),
            created_at: Utc::now(),
        };
        self.state_store.set(state.clone(), state_data).await?;
        tracing::debug!(issuer = %metadata.issuer, "saved authorization state");

        let login_hint = identity.is_some().then(|| input.as_ref().into());
        let parameters = PushedAuthorizationRequestParameters {
            response_type: AuthorizationResponseType::Code,
            redirect_uri,
            state,
            scope: Some(options.scopes.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ")),
            response_mode: Some(self.response_mode),
            code_challenge,
            code_challenge_method: AuthorizationCodeChallengeMethod::S256,
            login_hint,
            prompt: options.prompt.map(String::from),
        };
        if metadata.pushed_authorization_request_endpoint.is_some() {
            let server = self.server_agent(dpop_key, metadata.clone())?;
            let par_response = server
                .request::<OAuthPusehedAuthorizationRequestResponse>(
                    OAuthRequest::PushedAuthorizationRequest(parameters),
                )
                .await?;

            #[derive(Serialize)]
            struct Parameters {
                client_id: String,
                request_uri: String,
            }
            Ok(metadata.authorization_endpoint
                + "?"
                + &serde_html_form::to_string(Parameters {
                    client_id: self.client_metadata.client_id.clone(),
                    request_uri: par_response.request_uri,
                })?)
        } else if metadata.require_pushed_authorization_requests == Some(true) {
            Err(Error::Authorize("server requires PAR but no endpoint is available".into()))
        } else {
            #[derive(Serialize)]
            struct Parameters<'a> {
                client_id: &'a str,
                #[serde(flatten)]
                parameters: PushedAuthorizationRequestParameters,
            }
            Ok(metadata.authorization_endpoint
                + "?"
                + &serde_html_form::to_string(Parameters {
                    client_id: &self.client_metadata.client_id,
                    parameters,
                })?)
        }
    }
    /// Completes an authorization: exchanges the code with the key created in
    /// [`authorize`](Self::authorize) and stores the session under its `sub`.
    ///
    /// Returns the session and the application state passed to `authorize`.
    pub async fn callback(
        &self,
        params: CallbackParams,
    ) -> Result<(Session<JoseKey>, Option<String>)> {
        let Some(state_key) = params.state else {
            return Err(Error::Callback("missing `state` parameter".into()));
        };
        let Some(state) = self.state_store.get(&state_key).await? else {
            return Err(Error::Callback(format!("unknown authorization state: {state_key}")));
        };
        // the state is single use
        self.state_store.del(&state_key).await?;

        let metadata = self.resolver.get_authorization_server_metadata(&state.iss).await?;
        // https://datatracker.ietf.org/doc/html/rfc9207#section-2.4
        if let Some(iss) = params.iss {
            if iss != metadata.issuer {
                return Err(Error::Callback(format!(
                    "issuer mismatch: expected {}, got {iss}",
                    metadata.issuer
                )));
            }
        } else if metadata.authorization_response_iss_parameter_supported == Some(true) {
            return Err(Error::Callback("missing `iss` parameter".into()));
        }
        let Some(dpop_key) = state.dpop_key else {
            return Err(Error::NoDpopKey(format!("authorization state {state_key}")));
        };
        let redirect_uri = match state.redirect_uri {
            Some(uri) => uri,
            None => self
                .default_redirect_uri()
                .ok_or_else(|| Error::Callback("no redirect_uri available".into()))?
                .clone(),
        };
        let token_endpoint = metadata.token_endpoint.clone();
        let server = self.server_agent(dpop_key.clone(), metadata)?;
        let token_set = server.exchange_code(&params.code, &state.verifier, &redirect_uri).await?;
        let session = Session {
            sub: token_set.sub.clone(),
            token_set,
            token_endpoint,
            dpop_key: Some(dpop_key),
        };
        self.session_store.set(session.sub.clone(), session.clone()).await?;
        tracing::debug!(sub = %session.sub, "stored new session");
        Ok((session, state.app_state))
    }
    /// Loads the session of `sub`, refreshing it first if its access token has expired.
    pub async fn restore(&self, sub: &str) -> Result<Session<JoseKey>> {
        let session = self.load_session(sub).await?;
        if session.token_set.is_expired(Utc::now()) && session.token_set.refresh_token.is_some() {
            return self.refresh(sub).await;
        }
        Ok(session)
    }
    /// Refreshes the tokens of `sub` while holding the lock named after it.
    /// The bound DPoP key is reused as is.
    pub async fn refresh(&self, sub: &str) -> Result<Session<JoseKey>> {
        self.runtime
            .request_lock(sub, async {
                // read inside the lock: another holder may have refreshed already
                let session = self.load_session(sub).await?;
                let Some(dpop_key) = session.dpop_key.clone() else {
                    return Err(Error::NoDpopKey(sub.to_string()));
                };
                let metadata =
                    self.resolver.get_authorization_server_metadata(&session.token_set.iss).await?;
                let server = self.server_agent(dpop_key, metadata)?;
                let token_set = server.refresh(&session.token_set).await?;
                let session = Session { token_set, ..session };
                self.session_store.set(sub.to_string(), session.clone()).await?;
                tracing::debug!(sub, "refreshed session");
                Ok::<_, Error>(session)
            })
            .await?
    }
    /// Revokes the tokens of `sub` (best-effort) and deletes its session.
    pub async fn revoke(&self, sub: &str) -> Result<()> {
        let key = sub.to_string();
        if let Some(session) = self.session_store.get(&key).await? {
            if let Some(dpop_key) = session.dpop_key {
                match self.resolver.get_authorization_server_metadata(&session.token_set.iss).await
                {
                    Ok(metadata) => {
                        self.server_agent(dpop_key, metadata)?
                            .revoke(&session.token_set.access_token)
                            .await;
                    }
                    Err(e) => tracing::debug!(error = %e, "skipping token revocation"),
                }
            }
        }
        self.session_store.del(&key).await?;
        Ok(())
    }
    async fn load_session(&self, sub: &str) -> Result<Session<JoseKey>> {
        self.session_store
            .get(&sub.to_string())
            .await?
            .ok_or_else(|| Error::NoSession(sub.to_string()))
    }
    fn server_agent(
        &self,
        dpop_key: JoseKey,
        metadata: OAuthAuthorizationServerMetadata,
    ) -> Result<OAuthServerAgent<T, H>> {
        Ok(OAuthServerAgent::new(
            dpop_key,
            metadata,
            self.client_metadata.clone(),
            self.resolver.clone(),
            self.http_client.clone(),
            self.nonces.clone(),
        )?)
    }
    fn generate_pkce(&self) -> Result<(String, String)> {
        // https://datatracker.ietf.org/doc/html/rfc7636#section-4.1
        let verifier = URL_SAFE_NO_PAD.encode(self.runtime.get_random_values(32));
        Ok((code_challenge(&self.runtime, &verifier)?, verifier))
    }
}

impl<S0, S1, T, H, L> AtprotoOAuthClient<S0, S1, T, H, L> {
    fn default_redirect_uri(&self) -> Option<&String> {
        self.client_metadata.redirect_uris.first()
    }
}

// https://datatracker.ietf.org/doc/html/rfc7636#section-4.2
fn code_challenge<L>(runtime: &Runtime<L>, verifier: &str) -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(runtime.digest(verifier.as_bytes(), "sha256")?))
}

/// Fetches and validates the client metadata document published at `client_id`.
pub async fn fetch_client_metadata<T>(
    http_client: &T,
    client_id: &str,
) -> Result<OAuthClientMetadata>
where
    T: HttpClient + Send + Sync,
{
    let res = http_client
        .send_http(Request::builder().uri(client_id).body(Vec::new())?)
        .await
        .map_err(Error::HttpClient)?;
    if res.status() != StatusCode::OK {
        return Err(Error::HttpStatus(res.status()));
    }
    let metadata = serde_json::from_slice::<OAuthClientMetadata>(res.body())?;
    if metadata.client_id != client_id {
        return Err(Error::ClientMetadata(crate::atproto::Error::InvalidClientId));
    }
    Ok(metadata.try_into_client_metadata()?)
}
