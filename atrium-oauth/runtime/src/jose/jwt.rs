use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Claims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
    #[serde(flatten)]
    pub public: PublicClaims,
}

// https://datatracker.ietf.org/doc/html/rfc7519#section-4.1
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegisteredClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<RegisteredClaimsAud>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

// https://datatracker.ietf.org/doc/html/rfc9449#section-4.2
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PublicClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl From<RegisteredClaims> for Claims {
    fn from(registered: RegisteredClaims) -> Self {
        Self { registered, public: PublicClaims::default() }
    }
}

// https://datatracker.ietf.org/doc/html/rfc7519#section-4.1.3
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisteredClaimsAud {
    Single(String),
    Multiple(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_claims() {
        // empty
        {
            let claims = Claims::default();
            let json = serde_json::to_string(&claims).expect("failed to serialize claims");
            assert_eq!(json, "{}");
        }
        // multiple auds
        {
            let claims = Claims::from(RegisteredClaims {
                aud: Some(RegisteredClaimsAud::Multiple(vec![
                    String::from("client1"),
                    String::from("client2"),
                ])),
                ..Default::default()
            });
            let json = serde_json::to_string(&claims).expect("failed to serialize claims");
            assert_eq!(json, r#"{"aud":["client1","client2"]}"#);
        }
        // dpop proof claims
        {
            let claims = Claims {
                registered: RegisteredClaims {
                    jti: Some(String::from("jti")),
                    iat: Some(1_700_000_000),
                    ..Default::default()
                },
                public: PublicClaims {
                    htm: Some(String::from("POST")),
                    htu: Some(String::from("https://example.com/token")),
                    ..Default::default()
                },
            };
            let json = serde_json::to_string(&claims).expect("failed to serialize claims");
            assert_eq!(
                json,
                r#"{"iat":1700000000,"jti":"jti","htm":"POST","htu":"https://example.com/token"}"#
            );
        }
    }
}
