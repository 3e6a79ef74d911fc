//! A [`Store`] adapter that keeps each record bound to one DPoP key.
//!
//! Records hold a live [`JoseKey`] in memory and its JWK form at rest. Reads
//! reconstruct the key, writes export it, and no other field is touched.
use super::Store;
use crate::jose_key::{self, JoseKey};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error<E> {
    #[error("store error: {0}")]
    Store(#[source] E),
    #[error("malformed dpop key: {0}")]
    MalformedKey(#[source] jose_key::Error),
}

/// A record type carrying an optional DPoP key, convertible to and from its
/// stored representation.
pub trait DpopKeyBound: Sized {
    type Raw;

    fn from_raw(raw: Self::Raw) -> jose_key::Result<Self>;
    fn into_raw(self) -> Self::Raw;
}

/// Wraps a store of raw records and exposes records with live keys.
///
/// The adapter never creates or removes a key; attaching one is up to the caller.
pub struct DpopKeyStore<S, V> {
    inner: S,
    _value: PhantomData<fn() -> V>,
}

impl<S, V> DpopKeyStore<S, V> {
    pub fn new(inner: S) -> Self {
        Self { inner, _value: PhantomData }
    }
    pub fn inner(&self) -> &S {
        &self.inner
    }
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, V> Clone for DpopKeyStore<S, V>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<S, V> std::fmt::Debug for DpopKeyStore<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DpopKeyStore").finish_non_exhaustive()
    }
}

pub fn to_dpop_key_store<S, V>(store: S) -> DpopKeyStore<S, V>
where
    V: DpopKeyBound,
{
    DpopKeyStore::new(store)
}

impl<S, V> Store<String, V> for DpopKeyStore<S, V>
where
    S: Store<String, V::Raw> + Sync,
    V: DpopKeyBound + Clone + Send + Sync,
    V::Raw: Clone + Send,
{
    type Error = Error<S::Error>;

    /// Reads a record and rebuilds its key.
    ///
    /// A JWK that parses but does not describe a usable key (unknown curve,
    /// bad coordinates, missing `d`, wrong `kid`) is [`Error::MalformedKey`].
    /// A JWK missing a required member (`kty`, `crv`, `x`, `y`) cannot be read
    /// into a [`DpopJwk`](crate::jose_key::DpopJwk) at all, so a store that
    /// deserializes records reports it from its own decoding as [`Error::Store`].
    async fn get(&self, key: &String) -> Result<Option<V>, Self::Error> {
        let Some(raw) = self.inner.get(key).await.map_err(Error::Store)? else {
            return Ok(None);
        };
        match V::from_raw(raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "stored dpop key could not be decoded");
                Err(Error::MalformedKey(e))
            }
        }
    }
    async fn set(&self, key: String, value: V) -> Result<(), Self::Error> {
        self.inner.set(key, value.into_raw()).await.map_err(Error::Store)
    }
    async fn del(&self, key: &String) -> Result<(), Self::Error> {
        self.inner.del(key).await.map_err(Error::Store)
    }
}
