use super::error::{Error, Result};
use super::{is_valid_did, HandleResolver, Resolver};
use crate::http_client::HttpClient;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use http::Request;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

const SUBDOMAIN: &str = "_atproto";
const PREFIX: &str = "did=";
const WELL_KNOWN_PATH: &str = "/.well-known/atproto-did";

#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait DnsTxtResolver {
    fn resolve(
        &self,
        query: &str,
    ) -> impl Future<
        Output = core::result::Result<
            Vec<String>,
            Box<dyn std::error::Error + Send + Sync + 'static>,
        >,
    >;
}

/// [`DnsTxtResolver`] using the system configuration, then the fallback
/// nameservers when the system lookup fails or finds nothing.
pub struct HickoryDnsTxtResolver {
    system: Option<TokioAsyncResolver>,
    fallback: Option<TokioAsyncResolver>,
}

impl HickoryDnsTxtResolver {
    pub fn new(fallback_nameservers: Option<&[IpAddr]>) -> Self {
        let system = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read system dns configuration");
                None
            }
        };
        let fallback = fallback_nameservers.filter(|ips| !ips.is_empty()).map(|ips| {
            TokioAsyncResolver::tokio(
                ResolverConfig::from_parts(
                    None,
                    vec![],
                    NameServerConfigGroup::from_ips_clear(ips, 53, true),
                ),
                ResolverOpts::default(),
            )
        });
        Self { system, fallback }
    }
    async fn lookup(
        resolver: &TokioAsyncResolver,
        query: &str,
    ) -> core::result::Result<Vec<String>, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let response = resolver.txt_lookup(query).await?;
        let mut out = Vec::new();
        for txt in response.iter() {
            for data in txt.txt_data().iter() {
                out.push(String::from_utf8_lossy(data).to_string());
            }
        }
        Ok(out)
    }
}

impl DnsTxtResolver for HickoryDnsTxtResolver {
    async fn resolve(
        &self,
        query: &str,
    ) -> core::result::Result<Vec<String>, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let system = match &self.system {
            Some(resolver) => Some(Self::lookup(resolver, query).await),
            None => None,
        };
        match (system, &self.fallback) {
            (Some(Ok(values)), _) if !values.is_empty() => Ok(values),
            (_, Some(fallback)) => {
                tracing::debug!(query, "retrying txt lookup with fallback nameservers");
                Self::lookup(fallback, query).await
            }
            (Some(result), None) => result,
            (None, None) => Err(Error::NotFound.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DnsHandleResolverConfig<R> {
    pub dns_txt_resolver: R,
}

pub struct DnsHandleResolver<R> {
    dns_txt_resolver: R,
}

impl<R> DnsHandleResolver<R> {
    pub fn new(config: DnsHandleResolverConfig<R>) -> Self {
        Self { dns_txt_resolver: config.dns_txt_resolver }
    }
}

impl<R> Resolver for DnsHandleResolver<R>
where
    R: DnsTxtResolver + Send + Sync + 'static,
{
    type Input = str;
    type Output = String;

    async fn resolve(&self, handle: &str) -> Result<String> {
        let results = self
            .dns_txt_resolver
            .resolve(&format!("{SUBDOMAIN}.{handle}"))
            .await
            .map_err(Error::DnsResolver)?;
        // exactly one `did=` record is expected
        let mut dids = results.iter().filter_map(|result| result.strip_prefix(PREFIX));
        match (dids.next(), dids.next()) {
            (Some(did), None) if is_valid_did(did) => Ok(did.to_string()),
            (Some(did), None) => Err(Error::Did(did.to_string())),
            _ => Err(Error::NotFound),
        }
    }
}

impl<R> HandleResolver for DnsHandleResolver<R> where R: DnsTxtResolver + Send + Sync + 'static {}

#[derive(Clone, Debug)]
pub struct WellKnownHandleResolverConfig<T> {
    pub http_client: Arc<T>,
}

pub struct WellKnownHandleResolver<T> {
    http_client: Arc<T>,
}

impl<T> WellKnownHandleResolver<T> {
    pub fn new(config: WellKnownHandleResolverConfig<T>) -> Self {
        Self { http_client: config.http_client }
    }
}

impl<T> Resolver for WellKnownHandleResolver<T>
where
    T: HttpClient + Send + Sync + 'static,
{
    type Input = str;
    type Output = String;

    async fn resolve(&self, handle: &str) -> Result<String> {
        let url = format!("https://{handle}{WELL_KNOWN_PATH}");
        let res = self
            .http_client
            .send_http(Request::builder().uri(url).body(Vec::new())?)
            .await
            .map_err(Error::HttpClient)?;
        if res.status().is_success() {
            let text = String::from_utf8_lossy(res.body());
            let did = text.trim();
            if is_valid_did(did) {
                Ok(did.to_string())
            } else {
                Err(Error::Did(did.to_string()))
            }
        } else {
            Err(Error::HttpStatus(res.status()))
        }
    }
}

impl<T> HandleResolver for WellKnownHandleResolver<T> where T: HttpClient + Send + Sync + 'static {}

#[derive(Clone, Debug)]
pub struct AtprotoHandleResolverConfig<R, T> {
    pub dns_txt_resolver: R,
    pub http_client: Arc<T>,
}

/// Resolves a handle through DNS first and the HTTPS well-known endpoint second.
pub struct AtprotoHandleResolver<R, T> {
    dns: DnsHandleResolver<R>,
    http: WellKnownHandleResolver<T>,
}

impl<R, T> AtprotoHandleResolver<R, T> {
    pub fn new(config: AtprotoHandleResolverConfig<R, T>) -> Self {
        Self {
            dns: DnsHandleResolver::new(DnsHandleResolverConfig {
                dns_txt_resolver: config.dns_txt_resolver,
            }),
            http: WellKnownHandleResolver::new(WellKnownHandleResolverConfig {
                http_client: config.http_client,
            }),
        }
    }
}

impl<R, T> Resolver for AtprotoHandleResolver<R, T>
where
    R: DnsTxtResolver + Send + Sync + 'static,
    T: HttpClient + Send + Sync + 'static,
{
    type Input = str;
    type Output = String;

    async fn resolve(&self, handle: &str) -> Result<String> {
        match self.dns.resolve(handle).await {
            Ok(did) => Ok(did),
            Err(e) => {
                tracing::debug!(handle, error = %e, "dns handle resolution failed");
                self.http.resolve(handle).await
            }
        }
    }
}

impl<R, T> HandleResolver for AtprotoHandleResolver<R, T>
where
    R: DnsTxtResolver + Send + Sync + 'static,
    T: HttpClient + Send + Sync + 'static,
{
}
