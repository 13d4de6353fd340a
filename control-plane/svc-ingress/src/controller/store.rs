use std::sync::Arc;

use futures_util::FutureExt;
use kube::Resource;
use kube::runtime::reflector::{ObjectRef, Store};

use super::key::ResourceKey;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("{0} not found in cache")]
    NotFound(ResourceKey),
    #[error("cache has not completed its initial sync")]
    NotSynced,
    #[error("cache writer stopped before the initial sync")]
    Closed,
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

/// Read side of a reflector store, addressed by [`ResourceKey`].
///
/// Lookups are refused until the writer has applied its first complete
/// listing.
pub struct ObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    reader: Store<K>,
}

impl<K> Clone for ObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<K> ObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    pub fn new(reader: Store<K>) -> Self {
        Self { reader }
    }

    pub fn get(&self, key: &ResourceKey) -> Result<Arc<K>, CacheError> {
        if !self.is_synced() {
            return Err(CacheError::NotSynced);
        }
        self.reader
            .get(&object_ref(key))
            .ok_or_else(|| CacheError::NotFound(key.clone()))
    }

    pub fn len(&self) -> usize {
        self.reader.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.reader.wait_until_ready().now_or_never(), Some(Ok(())))
    }

    /// Block until the initial list has been loaded.
    pub async fn wait_for_sync(&self) -> Result<(), CacheError> {
        self.reader
            .wait_until_ready()
            .await
            .map_err(|_| CacheError::Closed)
    }
}

pub fn object_ref<K>(key: &ResourceKey) -> ObjectRef<K>
where
    K: Resource<DynamicType = ()>,
{
    let oref = ObjectRef::new(&key.name);
    if key.namespace.is_empty() {
        oref
    } else {
        oref.within(&key.namespace)
    }
}
