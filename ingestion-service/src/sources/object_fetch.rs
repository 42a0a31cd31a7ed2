use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, path::Path as ObjectPath, ObjectStore};
use tokio::sync::Mutex;

use crate::pipeline::{FetchError, ObjectFetcher};

/// How a batch reference's `location` maps to an object store.
pub enum ObjectBackend {
    /// `location` is an S3 bucket; credentials and region come from the environment.
    S3 {
        region: Option<String>,
        endpoint: Option<String>,
        allow_http: bool,
    },
    /// `location` is a directory below `root`.
    Local { root: PathBuf },
    /// Fixed set of stores by location, for tests and replay tools.
    Static(HashMap<String, Arc<dyn ObjectStore>>),
}

/// Upper bound on cached per-location stores. Locations past the bound still
/// resolve, they are just built per fetch.
pub const MAX_CACHED_STORES: usize = 64;

/// `ObjectFetcher` over the `object_store` crate. Stores are built lazily per
/// location and reused across invocations.
///
/// For the local backend a location must be a relative path of plain
/// directory names; anything else is rejected before touching the disk.
pub struct ObjectStoreFetcher {
    backend: ObjectBackend,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreFetcher {
    pub fn new(backend: ObjectBackend) -> Self {
        Self {
            backend,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Single store served under one location name.
    pub fn single(location: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        let mut stores = HashMap::new();
        stores.insert(location.into(), store);
        Self::new(ObjectBackend::Static(stores))
    }

    async fn store_for(&self, location: &str, key: &str) -> Result<Arc<dyn ObjectStore>, FetchError> {
        if let ObjectBackend::Static(stores) = &self.backend {
            return lookup_static(stores, location, key);
        }

        if let ObjectBackend::Local { .. } = &self.backend {
            check_local_location(location)?;
        }

        let mut cache = self.stores.lock().await;
        if let Some(store) = cache.get(location) {
            return Ok(store.clone());
        }

        let store: Arc<dyn ObjectStore> = match &self.backend {
            ObjectBackend::S3 {
                region,
                endpoint,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(location)
                    .with_allow_http(*allow_http);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                Arc::new(builder.build().map_err(|e| FetchError::Rejected(format!("invalid S3 config: {e}")))?)
            }
            ObjectBackend::Local { root } => {
                let dir = root.join(Path::new(location));
                let fs = LocalFileSystem::new_with_prefix(&dir).map_err(|_| FetchError::NotFound {
                    location: location.to_string(),
                    key: key.to_string(),
                })?;
                Arc::new(fs)
            }
            ObjectBackend::Static(stores) => return lookup_static(stores, location, key),
        };

        if cache.len() < MAX_CACHED_STORES {
            cache.insert(location.to_string(), store.clone());
        }
        Ok(store)
    }

    #[cfg(test)]
    async fn cached_locations(&self) -> usize {
        self.stores.lock().await.len()
    }
}

fn check_local_location(location: &str) -> Result<(), FetchError> {
    let path = Path::new(location);
    let plain = !location.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(FetchError::Rejected(format!(
            "location '{location}' is not a directory name below the local root"
        )))
    }
}

fn lookup_static(
    stores: &HashMap<String, Arc<dyn ObjectStore>>,
    location: &str,
    key: &str,
) -> Result<Arc<dyn ObjectStore>, FetchError> {
    stores.get(location).cloned().ok_or_else(|| FetchError::NotFound {
        location: location.to_string(),
        key: key.to_string(),
    })
}

fn classify(location: &str, key: &str, err: object_store::Error) -> FetchError {
    match err {
        object_store::Error::NotFound { .. } => FetchError::NotFound {
            location: location.to_string(),
            key: key.to_string(),
        },
        e @ (object_store::Error::InvalidPath { .. }
        | object_store::Error::NotSupported { .. }
        | object_store::Error::NotImplemented) => FetchError::Rejected(e.to_string()),
        e => FetchError::Transient(e.to_string()),
    }
}

#[async_trait::async_trait]
impl ObjectFetcher for ObjectStoreFetcher {
    async fn fetch(&self, location: &str, key: &str) -> Result<Bytes, FetchError> {
        let store = self.store_for(location, key).await?;
        let path = ObjectPath::from(key);

        let result = store.get(&path).await.map_err(|e| classify(location, key, e))?;
        let body = result.bytes().await.map_err(|e| classify(location, key, e))?;

        metrics::counter!("batch_fetched_bytes_total").increment(body.len() as u64);
        Ok(body)
    }
}
