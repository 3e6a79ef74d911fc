use super::dpop::DpopKeyBound;
use super::memory::MemoryStore;
use crate::jose_key::{self, DpopJwk, JoseKey};
use crate::types::TokenSet;
use serde::{Deserialize, Serialize};

/// An established session, keyed by the account DID (`sub`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session<K> {
    pub sub: String,
    pub token_set: TokenSet,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_key: Option<K>,
}

pub type SavedSession = Session<DpopJwk>;

pub type MemorySessionStore = MemoryStore<String, SavedSession>;

impl DpopKeyBound for Session<JoseKey> {
    type Raw = SavedSession;

    fn from_raw(raw: Self::Raw) -> jose_key::Result<Self> {
        let Session { sub, token_set, token_endpoint, dpop_key } = raw;
        let dpop_key = dpop_key.as_ref().map(JoseKey::from_jwk).transpose()?;
        Ok(Self { sub, token_set, token_endpoint, dpop_key })
    }
    fn into_raw(self) -> Self::Raw {
        let Session { sub, token_set, token_endpoint, dpop_key } = self;
        Session { sub, token_set, token_endpoint, dpop_key: dpop_key.as_ref().map(JoseKey::to_jwk) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OAuthTokenType;
    use serde_json::json;

    fn token_set() -> TokenSet {
        TokenSet {
            iss: String::from("https://bsky.social"),
            sub: String::from("did:plc:z72i7hdynmk6r22z27h6tvur"),
            aud: String::from("https://puffball.us-east.host.bsky.network"),
            scope: Some(String::from("atproto")),
            refresh_token: Some(String::from("refresh")),
            access_token: String::from("access"),
            token_type: OAuthTokenType::DPoP,
            expires_at: None,
        }
    }

    #[test]
    fn test_session_serde() {
        let key = JoseKey::generate(&["ES256"]).expect("failed to generate key");
        let session = Session {
            sub: String::from("did:plc:z72i7hdynmk6r22z27h6tvur"),
            token_set: token_set(),
            token_endpoint: String::from("https://bsky.social/oauth/token"),
            dpop_key: Some(key.clone()),
        };
        let json = serde_json::to_string(&session.clone().into_raw())
            .expect("failed to serialize session");
        let raw = serde_json::from_str::<SavedSession>(&json).expect("failed to deserialize");
        let kid = raw.dpop_key.as_ref().and_then(|jwk| jwk.kid.as_deref());
        assert_eq!(kid, Some(key.thumbprint()));
        assert_eq!(Session::from_raw(raw).expect("failed to decode session"), session);
    }

    #[test]
    fn test_keyless_session() {
        let json = json!({
            "sub": "did:plc:z72i7hdynmk6r22z27h6tvur",
            "token_set": token_set(),
            "token_endpoint": "https://bsky.social/oauth/token",
        });
        let raw = serde_json::from_value::<SavedSession>(json).expect("failed to deserialize");
        assert_eq!(raw.dpop_key, None);
        let session = Session::<JoseKey>::from_raw(raw).expect("failed to decode session");
        assert_eq!(session.dpop_key, None);
        assert_eq!(session.token_set, token_set());
    }
}
