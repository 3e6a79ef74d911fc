use super::error::{Error, Result};
use super::{DidResolver, Resolver};
use crate::http_client::HttpClient;
use http::header::ACCEPT;
use http::uri::{Builder, Scheme};
use http::{Request, Uri};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_PLC_DIRECTORY_URL: &str = "https://plc.directory/";

const DID_PLC_PREFIX: &str = "did:plc:";
const DID_WEB_PREFIX: &str = "did:web:";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "@context")]
    pub context: Option<Vec<String>>,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub also_known_as: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub r#type: String,
    pub service_endpoint: String,
}

impl DidDocument {
    /// The endpoint of the `#atproto_pds` service, if it is a valid http(s) URL.
    pub fn get_pds_endpoint(&self) -> Option<String> {
        self.get_service_endpoint("#atproto_pds", "AtprotoPersonalDataServer")
    }
    fn get_service_endpoint(&self, id: &str, r#type: &str) -> Option<String> {
        let full_id = self.id.to_string() + id;
        let services = self.service.as_ref()?;
        let service_endpoint = services
            .iter()
            .find(|service| (service.id == id || service.id == full_id) && service.r#type == r#type)
            .map(|service| service.service_endpoint.clone())?;
        Some(service_endpoint).filter(|s| Self::validate_url(s))
    }
    fn validate_url(url: &str) -> bool {
        url.parse::<Uri>()
            .map(|uri| match uri.scheme() {
                Some(scheme) if (scheme == &Scheme::HTTP || scheme == &Scheme::HTTPS) => {
                    uri.host().is_some()
                }
                _ => false,
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct PlcDidResolverConfig<T> {
    pub plc_directory_url: String,
    pub http_client: Arc<T>,
}

pub struct PlcDidResolver<T> {
    plc_directory_url: String,
    http_client: Arc<T>,
}

impl<T> PlcDidResolver<T> {
    pub fn new(config: PlcDidResolverConfig<T>) -> Self {
        Self { plc_directory_url: config.plc_directory_url, http_client: config.http_client }
    }
}

impl<T> Resolver for PlcDidResolver<T>
where
    T: HttpClient + Send + Sync + 'static,
{
    type Input = str;
    type Output = DidDocument;

    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        let uri = Builder::from(self.plc_directory_url.parse::<Uri>()?)
            .path_and_query(format!("/{did}"))
            .build()?;
        let res = self
            .http_client
            .send_http(Request::builder().uri(uri).body(Vec::new())?)
            .await
            .map_err(Error::HttpClient)?;
        if res.status().is_success() {
            Ok(serde_json::from_slice(res.body())?)
        } else {
            Err(Error::HttpStatus(res.status()))
        }
    }
}

impl<T> DidResolver for PlcDidResolver<T> where T: HttpClient + Send + Sync + 'static {}

pub struct WebDidResolver<T> {
    http_client: Arc<T>,
}

impl<T> WebDidResolver<T> {
    pub fn new(http_client: Arc<T>) -> Self {
        Self { http_client }
    }
}

impl<T> Resolver for WebDidResolver<T>
where
    T: HttpClient + Send + Sync + 'static,
{
    type Input = str;
    type Output = DidDocument;

    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        let host = did.strip_prefix(DID_WEB_PREFIX).ok_or_else(|| Error::Did(did.to_string()))?;
        // atproto only allows hostname-level did:web (an encoded port is fine)
        if host.contains(':') {
            return Err(Error::Did(did.to_string()));
        }
        let document_url =
            format!("https://{}/.well-known/did.json", host.replace("%3A", ":")).parse::<Uri>()?;
        let res = self
            .http_client
            .send_http(
                Request::builder()
                    .header(ACCEPT, "application/did+ld+json,application/json")
                    .uri(document_url)
                    .body(Vec::new())?,
            )
            .await
            .map_err(Error::HttpClient)?;
        if res.status().is_success() {
            Ok(serde_json::from_slice(res.body())?)
        } else {
            Err(Error::HttpStatus(res.status()))
        }
    }
}

impl<T> DidResolver for WebDidResolver<T> where T: HttpClient + Send + Sync + 'static {}

#[derive(Clone, Debug)]
pub struct CommonDidResolverConfig<T> {
    pub plc_directory_url: String,
    pub http_client: Arc<T>,
}

/// Dispatches to the `did:plc` or `did:web` resolver by method.
pub struct CommonDidResolver<T> {
    plc_resolver: PlcDidResolver<T>,
    web_resolver: WebDidResolver<T>,
}

impl<T> CommonDidResolver<T> {
    pub fn new(config: CommonDidResolverConfig<T>) -> Self {
        Self {
            plc_resolver: PlcDidResolver::new(PlcDidResolverConfig {
                plc_directory_url: config.plc_directory_url,
                http_client: config.http_client.clone(),
            }),
            web_resolver: WebDidResolver::new(config.http_client),
        }
    }
}

impl<T> Resolver for CommonDidResolver<T>
where
    T: HttpClient + Send + Sync + 'static,
{
    type Input = str;
    type Output = DidDocument;

    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        let document = if did.starts_with(DID_PLC_PREFIX) {
            self.plc_resolver.resolve(did).await?
        } else if did.starts_with(DID_WEB_PREFIX) {
            self.web_resolver.resolve(did).await?
        } else {
            return Err(Error::UnsupportedDidMethod(did.to_string()));
        };
        if document.id != did {
            return Err(Error::DidDocument(format!(
                "did document id `{}` does not match `{did}`",
                document.id
            )));
        }
        Ok(document)
    }
}

impl<T> DidResolver for CommonDidResolver<T> where T: HttpClient + Send + Sync + 'static {}
