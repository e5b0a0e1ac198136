//! The loader facade: composes the persistent store, the fetcher, the
//! resource pools, the fallback generator, and the instance table.
//!
//! Load flow per key: pool hit -> persistent store hit (decode, no network)
//! -> fetch (write-through to the store before decoding) -> on any network
//! or decode failure, the fallback generator. Callers always receive a
//! usable handle; the only errors that cross this boundary are caller
//! mistakes (`Config`, `NotLoaded`). Nothing here can take down the render
//! loop.

use std::sync::atomic::{AtomicU64, Ordering};

use atrium_core::{EntityId, Transform};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{ModelConfig, TextureParams};
use crate::error::{AssetError, FetchError};
use crate::fallback;
use crate::fetch::AssetFetcher;
use crate::handle::{ModelHandle, Origin, TextureHandle};
use crate::instance::{Instance, InstanceId, InstanceTable};
use crate::key::CacheKey;
use crate::mesh::{self, MeshAsset};
use crate::pool::{Acquire, ResourcePool};
use crate::store::BlobStore;
use crate::texture::{self, TextureAsset};

/// Point-in-time snapshot of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Ready entries across both pools.
    pub pooled: usize,
    /// Loads currently in flight across both pools.
    pub in_flight: usize,
    /// Loads satisfied from the persistent store without a network call.
    pub store_hits: u64,
    /// Network fetch attempts.
    pub fetches: u64,
    /// Resources built by the fallback generator (including deliberate
    /// procedural loads).
    pub fallbacks: u64,
}

#[derive(Default)]
struct Counters {
    store_hits: AtomicU64,
    fetches: AtomicU64,
    fallbacks: AtomicU64,
}

/// Central asset registry: loads, caches, deduplicates, and instances
/// remote assets. The fetcher and store are injected so lifecycle and
/// testing stay deterministic; there are no process-wide globals.
pub struct AssetServer<F: AssetFetcher, S: BlobStore> {
    fetcher: F,
    store: S,
    textures: ResourcePool<TextureAsset>,
    models: ResourcePool<MeshAsset>,
    instances: Mutex<InstanceTable>,
    counters: Counters,
}

impl<F: AssetFetcher, S: BlobStore> AssetServer<F, S> {
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            textures: ResourcePool::new(),
            models: ResourcePool::new(),
            instances: Mutex::new(InstanceTable::new()),
            counters: Counters::default(),
        }
    }

    /// The cache key a texture request resolves to. Distinct variant
    /// parameters produce distinct keys and distinct pool entries.
    pub fn texture_key(&self, source_locator: &str, params: &TextureParams) -> CacheKey {
        params.cache_key(source_locator)
    }

    /// The cache key a model request resolves to, rooted at the model id.
    pub fn model_key(&self, model_id: &str, config: &ModelConfig) -> CacheKey {
        config.cache_key(model_id)
    }

    /// Load a texture, coalescing with any in-flight load of the same key.
    /// Never fails for environmental reasons: network and decode problems
    /// degrade to a procedural stand-in.
    pub async fn load_texture(
        &self,
        source_locator: &str,
        params: &TextureParams,
    ) -> Result<TextureHandle, AssetError> {
        params.validate()?;
        let key = params.cache_key(source_locator);

        // If this future is cancelled mid-load, the guard's drop abandons
        // the slot so waiters retry instead of blocking forever.
        let guard = loop {
            match self.textures.acquire(&key) {
                Acquire::Ready(handle) => return Ok(handle),
                Acquire::Join(rx) => {
                    if let Ok(handle) = rx.await {
                        return Ok(handle);
                    }
                    // The in-flight load was abandoned or cleared; retry.
                }
                Acquire::Load(guard) => break guard,
            }
        };

        let (resource, origin) = match self.load_bytes(&key, source_locator).await {
            Ok(bytes) => match texture::decode(&bytes) {
                Ok(tex) => (tex, Origin::Fetched),
                Err(err) => {
                    warn!("texture decode failed for '{}': {}", key, err);
                    self.fallback_texture(source_locator, params)
                }
            },
            Err(err) => {
                warn!("texture fetch failed for '{}': {}", key, err);
                self.fallback_texture(source_locator, params)
            }
        };

        Ok(guard.complete(resource, origin))
    }

    /// Load a model, coalescing with any in-flight load of the same key.
    /// With `use_procedural` set the network is skipped entirely.
    pub async fn load_model(
        &self,
        model_id: &str,
        config: &ModelConfig,
    ) -> Result<ModelHandle, AssetError> {
        config.validate()?;
        let key = config.cache_key(model_id);

        let guard = loop {
            match self.models.acquire(&key) {
                Acquire::Ready(handle) => return Ok(handle),
                Acquire::Join(rx) => {
                    if let Ok(handle) = rx.await {
                        return Ok(handle);
                    }
                }
                Acquire::Load(guard) => break guard,
            }
        };

        let (resource, origin) = if config.use_procedural {
            self.fallback_model(model_id, config)
        } else {
            match self.load_bytes(&key, &config.source_locator).await {
                Ok(bytes) => match mesh::decode(&bytes) {
                    Ok(mesh) => (mesh, Origin::Fetched),
                    Err(err) => {
                        warn!("model decode failed for '{}': {}", key, err);
                        self.fallback_model(model_id, config)
                    }
                },
                Err(err) => {
                    warn!("model fetch failed for '{}': {}", key, err);
                    self.fallback_model(model_id, config)
                }
            }
        };

        Ok(guard.complete(resource, origin))
    }

    /// Store-then-network byte retrieval with write-through caching: bytes
    /// land in the persistent store before decoding so a decode bug is
    /// recoverable without a refetch.
    async fn load_bytes(&self, key: &CacheKey, locator: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(entry) = self.store.get(key) {
            self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.bytes);
        }
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let bytes = self.fetcher.fetch(locator).await?;
        self.store.put(key, &bytes);
        Ok(bytes)
    }

    fn fallback_texture(
        &self,
        source_locator: &str,
        params: &TextureParams,
    ) -> (TextureAsset, Origin) {
        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        (
            fallback::fallback_texture(source_locator, &params.variant),
            Origin::Fallback,
        )
    }

    fn fallback_model(&self, model_id: &str, config: &ModelConfig) -> (MeshAsset, Origin) {
        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        (
            fallback::fallback_model(model_id, &config.variant_params),
            Origin::Fallback,
        )
    }

    /// Release one texture reference. The pooled resource is disposed
    /// exactly when its last reference goes. A handle whose entry was
    /// already cleared releases nothing.
    pub fn release_texture(&self, handle: TextureHandle) {
        self.textures.release(handle.key(), handle.id());
    }

    /// Release one model reference.
    pub fn release_model(&self, handle: ModelHandle) {
        self.models.release(handle.key(), handle.id());
    }

    /// Place an instance of an already-loaded model. Loads the base once,
    /// then create as many placements as needed; each shares the pooled
    /// geometry and bumps its ref count by one.
    pub fn create_instance(
        &self,
        base_key: &CacheKey,
        transform: Transform,
        owner_scene: EntityId,
    ) -> Result<InstanceId, AssetError> {
        // Instancing requires a Ready entry; a missing base is a caller
        // mistake, not an environmental failure.
        let handle = self
            .models
            .retain(base_key)
            .ok_or_else(|| AssetError::NotLoaded(base_key.to_string()))?;
        let id = self.instances.lock().insert(
            base_key.clone(),
            handle.id(),
            transform,
            owner_scene,
        );
        Ok(id)
    }

    /// Remove a placement and release its reference. Returns false if the
    /// instance was already disposed.
    pub fn dispose_instance(&self, id: InstanceId) -> bool {
        let removed = self.instances.lock().remove(id);
        match removed {
            Some(instance) => {
                self.models.release(&instance.base_key, instance.entry_id);
                true
            }
            None => false,
        }
    }

    /// Remove every placement referencing `base_key` (bulk teardown, e.g.
    /// scene reset). Returns the number of instances disposed.
    pub fn dispose_all_instances(&self, base_key: &CacheKey) -> usize {
        let removed = self.instances.lock().remove_all_for(base_key);
        for instance in &removed {
            self.models.release(&instance.base_key, instance.entry_id);
        }
        removed.len()
    }

    /// Remove every placement owned by `scene` (scene teardown).
    pub fn dispose_scene(&self, scene: EntityId) -> usize {
        let removed = self.instances.lock().remove_all_for_scene(scene);
        for instance in &removed {
            self.models.release(&instance.base_key, instance.entry_id);
        }
        removed.len()
    }

    /// Clear both the persistent store and the in-memory pools. Intended
    /// for corruption recovery: future loads start from scratch.
    /// Outstanding handles stay usable until released.
    pub fn clear_cache(&self) {
        self.store.clear();
        let evicted = self.textures.clear() + self.models.clear();
        info!("cache cleared ({} pooled entries dropped)", evicted);
    }

    pub fn instance(&self, id: InstanceId) -> Option<Instance> {
        self.instances.lock().get(id).cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// Whether a Ready texture entry exists for this key.
    pub fn is_texture_loaded(&self, key: &CacheKey) -> bool {
        self.textures.contains(key)
    }

    /// Whether a Ready model entry exists for this key.
    pub fn is_model_loaded(&self, key: &CacheKey) -> bool {
        self.models.contains(key)
    }

    pub fn pooled_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn pooled_models(&self) -> usize {
        self.models.len()
    }

    pub fn texture_ref_count(&self, key: &CacheKey) -> Option<usize> {
        self.textures.ref_count(key)
    }

    pub fn model_ref_count(&self, key: &CacheKey) -> Option<usize> {
        self.models.ref_count(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            pooled: self.textures.len() + self.models.len(),
            in_flight: self.textures.in_flight() + self.models.in_flight(),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }
}
