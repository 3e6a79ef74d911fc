use crate::atproto::{Error, KnownScope, Result, Scope};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientMetadata {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    // https://datatracker.ietf.org/doc/html/rfc9449#section-5.2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_bound_access_tokens: Option<bool>,
}

pub trait TryIntoOAuthClientMetadata {
    type Error;

    fn try_into_client_metadata(self) -> core::result::Result<OAuthClientMetadata, Self::Error>;
}

impl TryIntoOAuthClientMetadata for OAuthClientMetadata {
    type Error = Error;

    fn try_into_client_metadata(self) -> Result<OAuthClientMetadata> {
        if self.redirect_uris.is_empty() {
            return Err(Error::EmptyRedirectUris);
        }
        if let Some(grant_types) = &self.grant_types {
            if !grant_types.iter().any(|grant_type| grant_type == "authorization_code") {
                return Err(Error::InvalidGrantTypes);
            }
        }
        if let Some(scope) = &self.scope {
            let atproto = Scope::Known(KnownScope::Atproto);
            if !scope.split(' ').any(|s| s == atproto.as_ref()) {
                return Err(Error::InvalidScope);
            }
        }
        match self.token_endpoint_auth_method.as_deref() {
            None | Some("none") => {}
            Some(_) => return Err(Error::UnsupportedAuthMethod),
        }
        if self.dpop_bound_access_tokens == Some(false) {
            return Err(Error::DpopBoundAccessTokens);
        }
        Ok(self)
    }
}
