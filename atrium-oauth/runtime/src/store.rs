pub mod dpop;
pub mod memory;
pub mod session;
pub mod state;

pub use dpop::{to_dpop_key_store, DpopKeyBound, DpopKeyStore};
pub use memory::MemoryStore;

use std::error::Error;
use std::future::Future;
use std::hash::Hash;

/// A plain key-value store supplied by the host.
///
/// Operations are atomic per key; there is no listing, ordering or
/// multi-key transaction. Concurrent writers to one key: last write wins.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait Store<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    type Error: Error + Send + Sync + 'static;

    fn get(&self, key: &K) -> impl Future<Output = Result<Option<V>, Self::Error>>;
    fn set(&self, key: K, value: V) -> impl Future<Output = Result<(), Self::Error>>;
    fn del(&self, key: &K) -> impl Future<Output = Result<(), Self::Error>>;
}
