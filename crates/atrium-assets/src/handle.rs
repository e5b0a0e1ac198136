use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::key::CacheKey;
use crate::mesh::MeshAsset;
use crate::texture::TextureAsset;

/// Unique identifier for a pool entry. Every handle to the same entry
/// carries the same id; a re-acquired key after eviction gets a fresh one.
pub type AssetId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_asset_id() -> AssetId {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Where a pooled resource came from. Fallback resources obey the identical
/// lifecycle; this is exposed as a diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Fetched,
    Fallback,
}

/// A reference to a pooled, decoded resource.
///
/// Handles share the underlying data via `Arc`, but the pool remains the
/// sole authority over entry lifetime: dropping a handle does NOT release
/// its reference. Pass it back to the server's `release_*` methods.
#[derive(Debug, Clone)]
pub struct AssetHandle<T> {
    id: AssetId,
    key: CacheKey,
    origin: Origin,
    data: Arc<T>,
}

impl<T> AssetHandle<T> {
    pub(crate) fn new(id: AssetId, key: CacheKey, origin: Origin, data: Arc<T>) -> Self {
        Self {
            id,
            key,
            origin,
            data,
        }
    }

    /// The id of the pool entry this handle references.
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// The cache key this handle was acquired under. Use it to create
    /// instances and to release the handle.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// The decoded (or procedurally generated) resource.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Whether two handles reference the identical underlying resource
    /// (pointer identity, not value equality).
    pub fn shares_resource_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

pub type TextureHandle = AssetHandle<TextureAsset>;
pub type ModelHandle = AssetHandle<MeshAsset>;
