//! Host primitives required by the OAuth engine: key creation, secure randomness,
//! digests and an optional named lock.
use crate::jose_key::{self, JoseKey};
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::convert::Infallible;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("lock error: {0}")]
    Lock(Box<dyn std::error::Error + Send + Sync + 'static>),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Mutual exclusion for critical sections identified by name.
///
/// Implementations backed by shared infrastructure (a database row, a redis key)
/// serialize callers across processes that share one store. The guard releases
/// the lock when dropped.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait RuntimeLock {
    type Guard: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    fn acquire(&self, name: &str) -> impl Future<Output = core::result::Result<Self::Guard, Self::Error>>;
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// In-process [`RuntimeLock`] keeping one mutex per name.
///
/// Only covers callers that share this value; it does not coordinate separate processes.
/// A name's entry is dropped once no holder or waiter is left.
#[derive(Clone, Debug, Default)]
pub struct LocalLock {
    locks: Arc<LockMap>,
}

impl RuntimeLock for LocalLock {
    type Guard = LocalLockGuard;
    type Error = Infallible;

    async fn acquire(&self, name: &str) -> core::result::Result<Self::Guard, Self::Error> {
        let mutex = self.locks.entry(name.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        Ok(LocalLockGuard {
            name: name.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        })
    }
}

/// Held while a [`LocalLock`] name is locked.
#[derive(Debug)]
pub struct LocalLockGuard {
    name: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LocalLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // only the map's own reference left: nobody holds or waits on this name
        self.locks.remove_if(&self.name, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha384" | "sha-384" => Ok(Self::Sha384),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl DigestAlgorithm {
    pub fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
            Self::Sha384 => Sha384::digest(bytes).to_vec(),
            Self::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// The capability set handed to the OAuth engine.
#[derive(Debug)]
pub struct Runtime<L = LocalLock> {
    lock: Option<L>,
}

impl<L> Runtime<L> {
    /// Without a lock, concurrent first writes of a record's DPoP key may race and
    /// the last write wins; a warning is logged once here.
    pub fn new(lock: Option<L>) -> Self {
        if lock.is_none() {
            // Ok if only one instance of the client is running at a time.
            tracing::warn!("no lock mechanism provided, credentials might get revoked");
        }
        Self { lock }
    }
    pub fn has_lock(&self) -> bool {
        self.lock.is_some()
    }
    pub fn create_key<S>(&self, algs: &[S]) -> jose_key::Result<JoseKey>
    where
        S: AsRef<str>,
    {
        JoseKey::generate(algs)
    }
    pub fn get_random_values(&self, len: usize) -> Vec<u8> {
        fill_random(&mut OsRng, len)
    }
    pub fn digest(&self, bytes: &[u8], algorithm: &str) -> Result<Vec<u8>> {
        Ok(algorithm.parse::<DigestAlgorithm>()?.digest(bytes))
    }
}

impl<L> Runtime<L>
where
    L: RuntimeLock + Sync,
{
    /// Runs `critical_section` while holding the lock named `name`, or directly
    /// when no lock was supplied.
    pub async fn request_lock<F, T>(&self, name: &str, critical_section: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let Some(lock) = &self.lock else {
            return Ok(critical_section.await);
        };
        let _guard = lock.acquire(name).await.map_err(|e| Error::Lock(Box::new(e)))?;
        Ok(critical_section.await)
    }
}

fn fill_random<R>(rng: &mut R, len: usize) -> Vec<u8>
where
    R: RngCore + CryptoRng,
{
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}
