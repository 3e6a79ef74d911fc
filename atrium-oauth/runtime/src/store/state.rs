use super::dpop::DpopKeyBound;
use super::memory::MemoryStore;
use crate::jose_key::{self, DpopJwk, JoseKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending authorization, keyed by its `state` nonce.
///
/// `K` is the key representation: [`JoseKey`] in memory, [`DpopJwk`] at rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalStateData<K> {
    pub iss: String,
    pub state: String,
    pub verifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_key: Option<K>,
    pub app_state: Option<String>,
    /// The redirect URI sent with the authorization request, when not the default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The portable form handed to the underlying store.
pub type SavedState = InternalStateData<DpopJwk>;

pub type MemoryStateStore = MemoryStore<String, SavedState>;

impl DpopKeyBound for InternalStateData<JoseKey> {
    type Raw = SavedState;

    fn from_raw(raw: Self::Raw) -> jose_key::Result<Self> {
        let InternalStateData {
            iss,
            state,
            verifier,
            dpop_key,
            app_state,
            redirect_uri,
            created_at,
        } = raw;
        Ok(Self {
            iss,
            state,
            verifier,
            dpop_key: dpop_key.as_ref().map(JoseKey::from_jwk).transpose()?,
            app_state,
            redirect_uri,
            created_at,
        })
    }
    fn into_raw(self) -> Self::Raw {
        let InternalStateData {
            iss,
            state,
            verifier,
            dpop_key,
            app_state,
            redirect_uri,
            created_at,
        } = self;
        InternalStateData {
            iss,
            state,
            verifier,
            dpop_key: dpop_key.as_ref().map(JoseKey::to_jwk),
            app_state,
            redirect_uri,
            created_at,
        }
    }
}
