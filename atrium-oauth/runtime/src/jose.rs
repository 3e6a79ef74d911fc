pub mod jws;
pub mod jwt;
pub mod signing;

pub use self::signing::create_signed_jwt;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Header {
    Jws(jws::Header),
}
