use super::jwt::Claims;
use super::Header;
use crate::jose_key::JoseKey;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Builds a compact JWS over `claims`, signed with `key`.
pub fn create_signed_jwt(key: &JoseKey, header: Header, claims: Claims) -> serde_json::Result<String> {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_string(&header)?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&claims)?);
    let signature = key.sign(format!("{header}.{payload}").as_bytes());
    Ok(format!("{header}.{payload}.{}", URL_SAFE_NO_PAD.encode(signature)))
}
