#![doc = include_str!("../README.md")]
pub mod atproto;
mod error;
pub mod http_client;
pub mod jose;
pub mod jose_key;
mod oauth_client;
pub mod resolver;
pub mod runtime;
mod server_agent;
pub mod store;
pub mod types;
mod utils;

pub use atproto::{
    AtprotoClientMetadata, AtprotoLocalhostClientMetadata, GrantType, KnownScope, Scope,
};
pub use error::{Error, Result};
#[cfg(feature = "default-client")]
pub use http_client::DefaultHttpClient;
pub use http_client::HttpClient;
pub use jose_key::{DpopJwk, JoseKey, KeyAlgorithm};
pub use oauth_client::{fetch_client_metadata, AtprotoOAuthClient, OAuthClientConfig};
pub use runtime::{LocalLock, Runtime, RuntimeLock};
pub use store::session::{SavedSession, Session};
pub use store::state::{InternalStateData, SavedState};
pub use store::{to_dpop_key_store, DpopKeyStore, MemoryStore, Store};
pub use types::{
    AuthorizationResponseMode, AuthorizeOptionPrompt, AuthorizeOptions, CallbackParams,
    OAuthClientMetadata, TokenSet,
};
