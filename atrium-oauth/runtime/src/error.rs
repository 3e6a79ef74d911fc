use crate::jose_key;
use crate::runtime;
use crate::store::dpop;
use crate::types::AuthorizationResponseMode;
use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("store error: {0}")]
    Store(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("malformed dpop key: {0}")]
    MalformedKey(String),
    #[error("none of the requested algorithms is supported: {0:?}")]
    UnsupportedAlgorithm(Vec<String>),
    #[error("signature error: {0}")]
    Signature(ecdsa::Error),
    #[error("lock error: {0}")]
    Lock(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("response mode `{0:?}` is not supported")]
    ResponseMode(AuthorizationResponseMode),
    #[error(transparent)]
    ClientMetadata(#[from] crate::atproto::Error),
    #[error(transparent)]
    Resolver(#[from] crate::resolver::Error),
    #[error(transparent)]
    ServerAgent(#[from] crate::server_agent::Error),
    #[error("authorize error: {0}")]
    Authorize(String),
    #[error("callback error: {0}")]
    Callback(String),
    #[error("no session found for {0}")]
    NoSession(String),
    #[error("no dpop key bound to {0}")]
    NoDpopKey(String),
    #[error(transparent)]
    Http(#[from] http::Error),
    #[error("http client error: {0}")]
    HttpClient(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("http status: {0}")]
    HttpStatus(StatusCode),
    #[error(transparent)]
    SerdeHtmlForm(#[from] serde_html_form::ser::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl From<jose_key::Error> for Error {
    fn from(error: jose_key::Error) -> Self {
        match error {
            jose_key::Error::UnsupportedAlgorithm(algs) => Self::UnsupportedAlgorithm(algs),
            jose_key::Error::MalformedKey(reason) => Self::MalformedKey(reason),
            jose_key::Error::Signature(e) => Self::Signature(e),
        }
    }
}

impl From<runtime::Error> for Error {
    fn from(error: runtime::Error) -> Self {
        match error {
            runtime::Error::UnsupportedAlgorithm(alg) => Self::UnsupportedAlgorithm(vec![alg]),
            runtime::Error::Lock(e) => Self::Lock(e),
        }
    }
}

impl<E> From<dpop::Error<E>> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: dpop::Error<E>) -> Self {
        match error {
            dpop::Error::Store(e) => Self::Store(Box::new(e)),
            dpop::Error::MalformedKey(e) => e.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
