//! Handle, DID and OAuth server metadata resolution.
mod did;
mod error;
mod handle;

pub use self::did::{
    CommonDidResolver, CommonDidResolverConfig, DidDocument, PlcDidResolver,
    PlcDidResolverConfig, Service, WebDidResolver, DEFAULT_PLC_DIRECTORY_URL,
};
pub use self::error::{Error, Result};
pub use self::handle::{
    AtprotoHandleResolver, AtprotoHandleResolverConfig, DnsHandleResolver,
    DnsHandleResolverConfig, DnsTxtResolver, HickoryDnsTxtResolver, WellKnownHandleResolver,
    WellKnownHandleResolverConfig,
};
use crate::http_client::HttpClient;
use crate::types::{OAuthAuthorizationServerMetadata, OAuthProtectedResourceMetadata};
use http::uri::Builder;
use http::{Request, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait Resolver {
    type Input: ?Sized;
    type Output;

    fn resolve(&self, input: &Self::Input) -> impl Future<Output = Result<Self::Output>>;
}

/// Resolves a handle to a DID.
pub trait HandleResolver: Resolver<Input = str, Output = String> {}

/// Resolves a DID to its document.
pub trait DidResolver: Resolver<Input = str, Output = DidDocument> {}

// https://atproto.com/specs/did
pub(crate) fn is_valid_did(did: &str) -> bool {
    let Some(rest) = did.strip_prefix("did:") else {
        return false;
    };
    let Some((method, id)) = rest.split_once(':') else {
        return false;
    };
    did.len() <= 2048
        && !method.is_empty()
        && method.bytes().all(|b| b.is_ascii_lowercase())
        && !id.is_empty()
        && !id.ends_with(':')
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b"._:%-".contains(&b))
}

// https://atproto.com/specs/handle
pub(crate) fn is_valid_handle(handle: &str) -> bool {
    let labels = handle.split('.').collect::<Vec<_>>();
    handle.len() <= 253
        && labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
        && labels.last().is_some_and(|tld| tld.starts_with(|c: char| c.is_ascii_alphabetic()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub did: String,
    pub pds: String,
}

#[derive(Clone, Debug)]
pub struct IdentityResolverConfig<D, H> {
    pub did_resolver: D,
    pub handle_resolver: H,
}

pub struct IdentityResolver<D, H> {
    did_resolver: D,
    handle_resolver: H,
}

impl<D, H> IdentityResolver<D, H> {
    pub fn new(config: IdentityResolverConfig<D, H>) -> Self {
        Self { did_resolver: config.did_resolver, handle_resolver: config.handle_resolver }
    }
}

impl<D, H> Resolver for IdentityResolver<D, H>
where
    D: DidResolver + Send + Sync + 'static,
    H: HandleResolver + Send + Sync + 'static,
{
    type Input = str;
    type Output = ResolvedIdentity;

    async fn resolve(&self, input: &str) -> Result<ResolvedIdentity> {
        let input = input.strip_prefix("at://").unwrap_or(input);
        let document = if input.starts_with("did:") {
            if !is_valid_did(input) {
                return Err(Error::AtIdentifier(input.to_string()));
            }
            self.did_resolver.resolve(input).await?
        } else {
            let handle = input.strip_prefix('@').unwrap_or(input).to_ascii_lowercase();
            if !is_valid_handle(&handle) {
                return Err(Error::AtIdentifier(input.to_string()));
            }
            let did = self.handle_resolver.resolve(&handle).await?;
            let document = self.did_resolver.resolve(&did).await?;
            let aka = format!("at://{handle}");
            if !document.also_known_as.as_ref().is_some_and(|akas| akas.contains(&aka)) {
                return Err(Error::DidDocument(format!(
                    "did document for `{did}` does not include the handle `{handle}`"
                )));
            }
            document
        };
        let Some(pds) = document.get_pds_endpoint() else {
            return Err(Error::DidDocument(format!(
                "no valid `AtprotoPersonalDataServer` service found in `{}`",
                document.id
            )));
        };
        tracing::debug!(did = %document.id, pds = %pds, "resolved identity");
        Ok(ResolvedIdentity { did: document.id, pds })
    }
}

#[derive(Clone, Debug)]
pub struct OAuthResolverConfig<T, H> {
    pub http_client: Arc<T>,
    pub handle_resolver: H,
    pub plc_directory_url: String,
}

/// Resolves a handle, DID or PDS URL to the metadata of its authorization server.
pub struct OAuthResolver<T, H> {
    identity_resolver: IdentityResolver<CommonDidResolver<T>, H>,
    http_client: Arc<T>,
}

impl<T, H> OAuthResolver<T, H> {
    pub fn new(config: OAuthResolverConfig<T, H>) -> Self {
        Self {
            identity_resolver: IdentityResolver::new(IdentityResolverConfig {
                did_resolver: CommonDidResolver::new(CommonDidResolverConfig {
                    plc_directory_url: config.plc_directory_url,
                    http_client: config.http_client.clone(),
                }),
                handle_resolver: config.handle_resolver,
            }),
            http_client: config.http_client,
        }
    }
}

impl<T, H> OAuthResolver<T, H>
where
    T: HttpClient + Send + Sync + 'static,
    H: HandleResolver + Send + Sync + 'static,
{
    pub async fn resolve(
        &self,
        input: &str,
    ) -> Result<(OAuthAuthorizationServerMetadata, Option<ResolvedIdentity>)> {
        if input.starts_with("https://") || input.starts_with("http://") {
            self.resolve_from_service(input).await.map(|metadata| (metadata, None))
        } else {
            let identity = self.identity_resolver.resolve(input).await?;
            let metadata = self.get_resource_server_metadata(&identity.pds).await?;
            Ok((metadata, Some(identity)))
        }
    }
    /// Resolves an identity only, without fetching server metadata.
    pub async fn resolve_identity(&self, input: &str) -> Result<ResolvedIdentity> {
        self.identity_resolver.resolve(input).await
    }
    // The input is either a PDS (protected resource) or an entryway (authorization server).
    async fn resolve_from_service(&self, input: &str) -> Result<OAuthAuthorizationServerMetadata> {
        match self.get_resource_server_metadata(input).await {
            Ok(metadata) => Ok(metadata),
            Err(Error::ProtectedResourceMetadata(_)) | Err(Error::HttpStatus(_)) => {
                self.get_authorization_server_metadata(input).await
            }
            Err(e) => Err(e),
        }
    }
    pub async fn get_resource_server_metadata(
        &self,
        pds: &str,
    ) -> Result<OAuthAuthorizationServerMetadata> {
        let rs_metadata = self.get_protected_resource_metadata(pds).await?;
        // ATPROTO requires one, and only one, authorization server entry
        // https://github.com/bluesky-social/proposals/tree/main/0004-oauth#server-metadata
        let issuer = match rs_metadata.authorization_servers.as_deref() {
            Some([issuer]) => issuer,
            Some(servers) if servers.len() > 1 => {
                return Err(Error::ProtectedResourceMetadata(format!(
                    "unable to determine authorization server for PDS: {pds}"
                )));
            }
            _ => {
                return Err(Error::ProtectedResourceMetadata(format!(
                    "no authorization server found for PDS: {pds}"
                )));
            }
        };
        let as_metadata = self.get_authorization_server_metadata(issuer).await?;
        // https://datatracker.ietf.org/doc/html/draft-ietf-oauth-resource-metadata-08#name-authorization-server-metada
        if let Some(protected_resources) = &as_metadata.protected_resources {
            if !protected_resources.iter().any(|r| same_origin(r, &rs_metadata.resource)) {
                return Err(Error::AuthorizationServerMetadata(format!(
                    "pds {pds} is not protected by issuer: {issuer}",
                )));
            }
        }
        Ok(as_metadata)
    }
    pub async fn get_protected_resource_metadata(
        &self,
        resource: &str,
    ) -> Result<OAuthProtectedResourceMetadata> {
        let metadata = self
            .get_well_known::<OAuthProtectedResourceMetadata>(
                resource,
                "/.well-known/oauth-protected-resource",
            )
            .await?;
        // https://datatracker.ietf.org/doc/html/draft-ietf-oauth-resource-metadata-08#section-3.3
        if same_origin(&metadata.resource, resource) {
            Ok(metadata)
        } else {
            Err(Error::ProtectedResourceMetadata(format!("invalid resource: {}", metadata.resource)))
        }
    }
    pub async fn get_authorization_server_metadata(
        &self,
        issuer: &str,
    ) -> Result<OAuthAuthorizationServerMetadata> {
        let metadata = self
            .get_well_known::<OAuthAuthorizationServerMetadata>(
                issuer,
                "/.well-known/oauth-authorization-server",
            )
            .await?;
        // https://datatracker.ietf.org/doc/html/rfc8414#section-3.3
        if !same_origin(&metadata.issuer, issuer) {
            return Err(Error::AuthorizationServerMetadata(format!(
                "invalid issuer: {}",
                metadata.issuer
            )));
        }
        // ATPROTO requires client_id_metadata_document
        if metadata.client_id_metadata_document_supported != Some(true) {
            return Err(Error::AuthorizationServerMetadata(format!(
                "authorization server does not support client_id_metadata_document: {issuer}"
            )));
        }
        Ok(metadata)
    }
    async fn get_well_known<O>(&self, base: &str, path: &str) -> Result<O>
    where
        O: DeserializeOwned,
    {
        let uri = Builder::from(base.parse::<Uri>()?).path_and_query(path).build()?;
        tracing::debug!(%uri, "fetching metadata");
        let res = self
            .http_client
            .send_http(Request::builder().uri(uri).body(Vec::new())?)
            .await
            .map_err(Error::HttpClient)?;
        if res.status() == StatusCode::OK {
            Ok(serde_json::from_slice(res.body())?)
        } else {
            Err(Error::HttpStatus(res.status()))
        }
    }
}

// issuers and resources are compared without a trailing slash
fn same_origin(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}
