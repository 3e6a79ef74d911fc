use crate::jose_key::{DpopJwk, KeyAlgorithm};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(flatten)]
    pub registered: RegisteredHeader,
}

impl From<Header> for super::Header {
    fn from(header: Header) -> Self {
        Self::Jws(header)
    }
}

// https://datatracker.ietf.org/doc/html/rfc7515#section-4.1
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredHeader {
    pub alg: KeyAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<DpopJwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
}

impl From<KeyAlgorithm> for RegisteredHeader {
    fn from(alg: KeyAlgorithm) -> Self {
        Self { alg, jwk: None, kid: None, typ: None, cty: None }
    }
}

impl From<RegisteredHeader> for super::Header {
    fn from(registered: RegisteredHeader) -> Self {
        Self::Jws(Header { registered })
    }
}
