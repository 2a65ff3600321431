use std::sync::Arc;

use lazyrow_store::{ConsistencyLevel, Storage};

use crate::cache::{PageCache, SharedPageCache};
use crate::config::ClientConfig;

/// A handle on one store plus the settings every record, container and view
/// built from it shares.
pub struct Client<S: Storage> {
    storage: Arc<S>,
    config: Arc<ClientConfig>,
    cache: Arc<dyn PageCache>,
}

impl<S: Storage> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: Storage> Client<S> {
    pub fn new(storage: S) -> Self {
        Self::from_arc(Arc::new(storage))
    }

    pub fn from_arc(storage: Arc<S>) -> Self {
        Self {
            storage,
            config: Arc::new(ClientConfig::default()),
            cache: SharedPageCache::global(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn PageCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &dyn PageCache {
        self.cache.as_ref()
    }

    /// Resolves the level for one call: call site, then the record's own
    /// default, then the client-wide one.
    pub fn consistency(
        &self,
        call_site: Option<ConsistencyLevel>,
        record_default: Option<ConsistencyLevel>,
    ) -> ConsistencyLevel {
        call_site
            .or(record_default)
            .unwrap_or(self.config.consistency)
    }
}
