mod common;

use atrium_oauth_runtime::resolver::{self, HandleResolver, Resolver};
use atrium_oauth_runtime::store::session::MemorySessionStore;
use atrium_oauth_runtime::store::state::MemoryStateStore;
use atrium_oauth_runtime::{
    fetch_client_metadata, AtprotoLocalhostClientMetadata, AtprotoOAuthClient,
    AuthorizationResponseMode, AuthorizeOptions, CallbackParams, DefaultHttpClient, Error,
    JoseKey, KnownScope, LocalLock, MemoryStore, OAuthClientConfig, SavedSession, SavedState,
    Scope, Store,
};
use common::WarningCounter;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;

const DID: &str = "did:plc:z72i7hdynmk6r22z27h6tvur";
const REDIRECT_URI: &str = "http://127.0.0.1:3000/oauth/callback";
const REQUEST_URI: &str = "urn:ietf:params:oauth:request_uri:req-3c4e9d2f";

struct StaticHandleResolver;

impl Resolver for StaticHandleResolver {
    type Input = str;
    type Output = String;

    async fn resolve(&self, handle: &str) -> resolver::Result<String> {
        match handle {
            "bsky.app" => Ok(String::from(DID)),
            _ => Err(resolver::Error::NotFound),
        }
    }
}

impl HandleResolver for StaticHandleResolver {}

/// Remembers every key written, since [`Store`] has no listing.
#[derive(Clone)]
struct RecordingStore<V> {
    inner: MemoryStore<String, V>,
    keys: Arc<Mutex<Vec<String>>>,
}

impl<V> Default for RecordingStore<V> {
    fn default() -> Self {
        Self { inner: MemoryStore::default(), keys: Arc::default() }
    }
}

impl<V> Store<String, V> for RecordingStore<V>
where
    V: Debug + Clone + Send + Sync + 'static,
{
    type Error = Infallible;

    async fn get(&self, key: &String) -> Result<Option<V>, Self::Error> {
        self.inner.get(key).await
    }
    async fn set(&self, key: String, value: V) -> Result<(), Self::Error> {
        self.keys.lock().unwrap().push(key.clone());
        self.inner.set(key, value).await
    }
    async fn del(&self, key: &String) -> Result<(), Self::Error> {
        self.inner.del(key).await
    }
}

type Client = AtprotoOAuthClient<
    RecordingStore<SavedState>,
    MemorySessionStore,
    DefaultHttpClient,
    StaticHandleResolver,
    LocalLock,
>;

fn client_metadata() -> AtprotoLocalhostClientMetadata {
    AtprotoLocalhostClientMetadata {
        redirect_uris: Some(vec![String::from(REDIRECT_URI)]),
        scopes: Some(scopes()),
    }
}

fn scopes() -> Vec<Scope> {
    vec![
        Scope::Known(KnownScope::Atproto),
        Scope::Known(KnownScope::TransitionChatBsky),
        Scope::Known(KnownScope::TransitionGeneric),
    ]
}

fn client(
    server: &ServerGuard,
    state_store: RecordingStore<SavedState>,
    session_store: MemorySessionStore,
) -> Client {
    AtprotoOAuthClient::with_handle_resolver(
        OAuthClientConfig {
            client_metadata: client_metadata(),
            response_mode: AuthorizationResponseMode::Query,
            state_store,
            session_store,
            http_client: DefaultHttpClient::default(),
            fallback_nameservers: None,
            plc_directory_url: Some(server.url()),
            request_lock: Some(LocalLock::default()),
        },
        StaticHandleResolver,
    )
    .expect("failed to create client")
}

// a PDS that is also its own authorization server
async fn mock_identity_and_metadata(server: &mut ServerGuard) -> Vec<Mock> {
    let url = server.url();
    vec![
        server
            .mock("GET", format!("/{DID}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "@context": ["https://www.w3.org/ns/did/v1"],
                    "id": DID,
                    "alsoKnownAs": ["at://bsky.app"],
                    "service": [{
                        "id": "#atproto_pds",
                        "type": "AtprotoPersonalDataServer",
                        "serviceEndpoint": url,
                    }],
                })
                .to_string(),
            )
            .create_async()
            .await,
        server
            .mock("GET", "/.well-known/oauth-protected-resource")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "resource": url, "authorization_servers": [url] }).to_string())
            .create_async()
            .await,
        server
            .mock("GET", "/.well-known/oauth-authorization-server")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "issuer": url,
                    "authorization_endpoint": format!("{url}/oauth/authorize"),
                    "token_endpoint": format!("{url}/oauth/token"),
                    "revocation_endpoint": format!("{url}/oauth/revoke"),
                    "pushed_authorization_request_endpoint": format!("{url}/oauth/par"),
                    "require_pushed_authorization_requests": true,
                    "scopes_supported": ["atproto", "transition:generic", "transition:chat.bsky"],
                    "response_types_supported": ["code"],
                    "response_modes_supported": ["query", "fragment", "form_post"],
                    "grant_types_supported": ["authorization_code", "refresh_token"],
                    "code_challenge_methods_supported": ["S256"],
                    "token_endpoint_auth_methods_supported": ["none", "private_key_jwt"],
                    "dpop_signing_alg_values_supported": ["RS256", "ES256"],
                    "authorization_response_iss_parameter_supported": true,
                    "client_id_metadata_document_supported": true,
                })
                .to_string(),
            )
            .create_async()
            .await,
    ]
}

async fn mock_par(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/oauth/par")
        .match_header("dpop", Matcher::Regex(String::from(r"^[\w-]+\.[\w-]+\.[\w-]+$")))
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("response_type".into(), "code".into()),
            Matcher::UrlEncoded("response_mode".into(), "query".into()),
            Matcher::UrlEncoded("redirect_uri".into(), REDIRECT_URI.into()),
            Matcher::UrlEncoded(
                "scope".into(),
                "atproto transition:chat.bsky transition:generic".into(),
            ),
            Matcher::UrlEncoded("code_challenge_method".into(), "S256".into()),
            Matcher::UrlEncoded("login_hint".into(), "bsky.app".into()),
        ]))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "request_uri": REQUEST_URI, "expires_in": 299 }).to_string())
        .create_async()
        .await
}

async fn mock_token(server: &mut ServerGuard, grant_type: &str, access_token: &str) -> Mock {
    server
        .mock("POST", "/oauth/token")
        .match_header("dpop", Matcher::Any)
        .match_body(Matcher::UrlEncoded("grant_type".into(), grant_type.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": access_token,
                "token_type": "DPoP",
                "expires_in": 3600,
                "refresh_token": format!("refresh-{access_token}"),
                "scope": "atproto transition:chat.bsky transition:generic",
                "sub": DID,
            })
            .to_string(),
        )
        .create_async()
        .await
}

fn authorize_options() -> AuthorizeOptions {
    AuthorizeOptions { scopes: scopes(), state: Some(String::from("app-state")), ..Default::default() }
}

#[tokio::test]
async fn authorize() {
    let mut server = Server::new_async().await;
    let _mocks = mock_identity_and_metadata(&mut server).await;
    let par = mock_par(&mut server).await;

    let state_store = RecordingStore::<SavedState>::default();
    let client = client(&server, state_store.clone(), MemorySessionStore::default());
    let url = client.authorize("bsky.app", authorize_options()).await.expect("failed to authorize");
    par.assert_async().await;

    let (endpoint, query) = url.split_once('?').expect("url should have a query");
    assert_eq!(endpoint, format!("{}/oauth/authorize", server.url()));
    let params = serde_html_form::from_str::<HashMap<String, String>>(query)
        .expect("query should be well-formed");
    assert_eq!(params.len(), 2);
    assert_eq!(params["client_id"], client.client_metadata.client_id);
    assert_eq!(params["request_uri"], REQUEST_URI);
    assert!(params["client_id"].starts_with("http://localhost?redirect_uri="));

    // the state was saved with its key in portable form
    let keys = state_store.keys.lock().unwrap().clone();
    assert_eq!(keys.len(), 1);
    let saved = state_store
        .inner
        .get(&keys[0])
        .await
        .expect("failed to get state")
        .expect("state should be saved");
    assert_eq!(saved.iss, server.url());
    assert_eq!(saved.state, keys[0]);
    assert_eq!(saved.app_state.as_deref(), Some("app-state"));
    assert_eq!(saved.redirect_uri, None);
    let jwk = saved.dpop_key.expect("state should carry a dpop key");
    // the server does not support ES256K, so ES256 is chosen over RS256
    assert_eq!(jwk.crv, "P-256");
    assert_eq!(jwk.alg.as_deref(), Some("ES256"));
    assert!(jwk.d.is_some());
    let key = JoseKey::from_jwk(&jwk).expect("stored key should be valid");
    assert_eq!(jwk.kid.as_deref(), Some(key.thumbprint()));
}

#[tokio::test]
async fn session_keeps_its_key() {
    let mut server = Server::new_async().await;
    let _mocks = mock_identity_and_metadata(&mut server).await;
    let _par = mock_par(&mut server).await;
    let exchange = mock_token(&mut server, "authorization_code", "access-1").await;
    let refresh = mock_token(&mut server, "refresh_token", "access-2").await;
    let revoke = server
        .mock("POST", "/oauth/revoke")
        .match_body(Matcher::UrlEncoded("token".into(), "access-2".into()))
        .with_status(200)
        .create_async()
        .await;

    let state_store = RecordingStore::<SavedState>::default();
    let session_store = MemorySessionStore::default();
    let client = client(&server, state_store.clone(), session_store.clone());
    client.authorize("bsky.app", authorize_options()).await.expect("failed to authorize");
    let state = state_store.keys.lock().unwrap()[0].clone();
    let kid = state_store
        .inner
        .get(&state)
        .await
        .expect("failed to get state")
        .and_then(|saved| saved.dpop_key)
        .and_then(|jwk| jwk.kid)
        .expect("state should carry a key id");

    let (session, app_state) = client
        .callback(CallbackParams {
            code: String::from("code-1"),
            state: Some(state.clone()),
            iss: Some(server.url()),
        })
        .await
        .expect("failed to exchange code");
    exchange.assert_async().await;
    assert_eq!(app_state.as_deref(), Some("app-state"));
    assert_eq!(session.sub, DID);
    assert_eq!(session.token_set.access_token, "access-1");
    assert_eq!(session.token_set.aud, server.url());
    assert_eq!(session.dpop_key.as_ref().map(JoseKey::thumbprint), Some(kid.as_str()));
    // the authorization state is single use
    assert_eq!(state_store.inner.get(&state).await.expect("failed to get state"), None);

    // two reads give the same key
    for _ in 0..2 {
        let restored = client.restore(DID).await.expect("failed to restore session");
        assert_eq!(restored.dpop_key.as_ref().map(JoseKey::thumbprint), Some(kid.as_str()));
    }
    let saved = session_store
        .get(&String::from(DID))
        .await
        .expect("failed to get session")
        .expect("session should be saved");
    assert_eq!(saved.dpop_key.as_ref().and_then(|jwk| jwk.kid.as_deref()), Some(kid.as_str()));

    let refreshed = client.refresh(DID).await.expect("failed to refresh session");
    refresh.assert_async().await;
    assert_eq!(refreshed.token_set.access_token, "access-2");
    assert_eq!(refreshed.dpop_key.as_ref().map(JoseKey::thumbprint), Some(kid.as_str()));
    let restored = client.restore(DID).await.expect("failed to restore session");
    assert_eq!(restored.token_set.access_token, "access-2");
    assert_eq!(restored.dpop_key, refreshed.dpop_key);

    client.revoke(DID).await.expect("failed to revoke session");
    revoke.assert_async().await;
    let err = client.restore(DID).await.expect_err("expected to fail");
    assert!(matches!(err, Error::NoSession(sub) if sub == DID));
}

#[tokio::test]
async fn callback_errors() {
    let mut server = Server::new_async().await;
    let _mocks = mock_identity_and_metadata(&mut server).await;
    let _par = mock_par(&mut server).await;

    let state_store = RecordingStore::<SavedState>::default();
    let client = client(&server, state_store.clone(), MemorySessionStore::default());
    {
        let err = client
            .callback(CallbackParams { code: String::from("code"), state: None, iss: None })
            .await
            .expect_err("expected to fail");
        assert!(matches!(err, Error::Callback(_)));
    }
    {
        let err = client
            .callback(CallbackParams {
                code: String::from("code"),
                state: Some(String::from("unknown")),
                iss: Some(server.url()),
            })
            .await
            .expect_err("expected to fail");
        assert!(matches!(err, Error::Callback(_)));
    }
    {
        client.authorize("bsky.app", authorize_options()).await.expect("failed to authorize");
        let state = state_store.keys.lock().unwrap()[0].clone();
        let err = client
            .callback(CallbackParams {
                code: String::from("code"),
                state: Some(state),
                iss: Some(String::from("https://evil.example.com")),
            })
            .await
            .expect_err("expected to fail");
        assert!(matches!(err, Error::Callback(_)));
    }
}

#[tokio::test]
async fn corrupted_session_key() {
    let server = Server::new_async().await;
    let session_store = MemorySessionStore::default();
    let client = client(&server, RecordingStore::default(), session_store.clone());

    let mut jwk = JoseKey::generate(&["ES256"]).expect("failed to generate key").to_jwk();
    jwk.d = Some(String::from("AAAA"));
    let saved = serde_json::from_value::<SavedSession>(json!({
        "sub": DID,
        "token_set": {
            "iss": server.url(),
            "sub": DID,
            "aud": server.url(),
            "scope": "atproto",
            "refresh_token": "refresh",
            "access_token": "access",
            "token_type": "DPoP",
            "expires_at": null,
        },
        "token_endpoint": format!("{}/oauth/token", server.url()),
        "dpop_key": jwk,
    }))
    .expect("failed to build session");
    session_store.set(String::from(DID), saved).await.expect("failed to set session");

    let err = client.restore(DID).await.expect_err("expected to fail");
    assert!(matches!(err, Error::MalformedKey(_)));
    let err = client.refresh(DID).await.expect_err("expected to fail");
    assert!(matches!(err, Error::MalformedKey(_)));
}

#[tokio::test]
async fn fragment_response_mode() {
    let result = Client::with_handle_resolver(
        OAuthClientConfig {
            client_metadata: client_metadata(),
            response_mode: AuthorizationResponseMode::Fragment,
            state_store: RecordingStore::default(),
            session_store: MemorySessionStore::default(),
            http_client: DefaultHttpClient::default(),
            fallback_nameservers: None,
            plc_directory_url: None,
            request_lock: None,
        },
        StaticHandleResolver,
    );
    assert!(matches!(result, Err(Error::ResponseMode(AuthorizationResponseMode::Fragment))));
}

#[tokio::test]
async fn authorize_unknown_handle() {
    let server = Server::new_async().await;
    let client = client(&server, RecordingStore::default(), MemorySessionStore::default());
    let err = client
        .authorize("unknown.example.com", AuthorizeOptions::default())
        .await
        .expect_err("expected to fail");
    assert!(matches!(err, Error::Resolver(resolver::Error::NotFound)));
}

#[tokio::test]
async fn published_client_metadata() {
    let mut server = Server::new_async().await;
    let client_id = format!("{}/client-metadata.json", server.url());
    let document = |client_id: &str| {
        json!({
            "client_id": client_id,
            "client_name": "example",
            "redirect_uris": ["https://app.example.com/callback"],
            "scope": "atproto transition:generic",
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "application_type": "web",
            "token_endpoint_auth_method": "none",
            "dpop_bound_access_tokens": true,
        })
        .to_string()
    };
    let _published = server
        .mock("GET", "/client-metadata.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(document(&client_id))
        .create_async()
        .await;
    let _moved = server
        .mock("GET", "/moved.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(document(&client_id))
        .create_async()
        .await;

    let http_client = DefaultHttpClient::default();
    let metadata =
        fetch_client_metadata(&http_client, &client_id).await.expect("failed to fetch metadata");
    assert_eq!(metadata.client_id, client_id);
    assert_eq!(metadata.redirect_uris, vec![String::from("https://app.example.com/callback")]);

    // the document must name the URL it is served from
    let err = fetch_client_metadata(&http_client, &format!("{}/moved.json", server.url()))
        .await
        .expect_err("expected to fail");
    assert!(matches!(err, Error::ClientMetadata(_)));
    let err = fetch_client_metadata(&http_client, &format!("{}/missing.json", server.url()))
        .await
        .expect_err("expected to fail");
    assert!(matches!(err, Error::HttpStatus(_)));
}

#[tokio::test]
async fn warns_once_without_lock() {
    let mut server = Server::new_async().await;
    let _mocks = mock_identity_and_metadata(&mut server).await;
    let par = mock_par(&mut server).await;

    let counter = WarningCounter::default();
    let _default =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));
    let client = Client::with_handle_resolver(
        OAuthClientConfig {
            client_metadata: client_metadata(),
            response_mode: AuthorizationResponseMode::Query,
            state_store: RecordingStore::default(),
            session_store: MemorySessionStore::default(),
            http_client: DefaultHttpClient::default(),
            fallback_nameservers: None,
            plc_directory_url: Some(server.url()),
            request_lock: None,
        },
        StaticHandleResolver,
    )
    .expect("failed to create client");
    assert_eq!(counter.count("atrium_oauth_runtime"), 1);

    // the client works without a lock
    let url =
        client.authorize("bsky.app", authorize_options()).await.expect("failed to authorize");
    par.assert_async().await;
    assert!(url.starts_with(&format!("{}/oauth/authorize?", server.url())));
    assert_eq!(counter.count("atrium_oauth_runtime"), 1);
}

#[tokio::test]
async fn default_client_warns_once_without_lock() {
    let counter = WarningCounter::default();
    let _default =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));
    let _client: AtprotoOAuthClient<MemoryStateStore, MemorySessionStore> =
        AtprotoOAuthClient::new(OAuthClientConfig {
            client_metadata: client_metadata(),
            response_mode: AuthorizationResponseMode::Query,
            state_store: MemoryStateStore::default(),
            session_store: MemorySessionStore::default(),
            http_client: DefaultHttpClient::default(),
            fallback_nameservers: None,
            plc_directory_url: None,
            request_lock: None,
        })
        .expect("failed to create client");
    // a host without system dns configuration may add a resolver warning, never a second lock one
    assert_eq!(counter.count("atrium_oauth_runtime::runtime"), 1);
}
