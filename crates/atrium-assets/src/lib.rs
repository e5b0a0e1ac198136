//! Atrium Assets - remote asset loading, caching, and instancing
//!
//! The loading pipeline behind the Atrium venue renderer: a persistent
//! blob store plus an in-memory, reference-counted resource pool. Remote
//! textures and models are fetched once, deduplicated per cache key,
//! shared across scene placements through lightweight instances, and
//! replaced by deterministic procedural stand-ins whenever the network or
//! the bytes let us down. The experience degrades; it never breaks.

mod config;
mod error;
mod fallback;
mod fetch;
mod handle;
mod instance;
mod key;
mod mesh;
mod pool;
mod server;
mod store;
mod texture;

pub use config::{ModelConfig, TextureParams};
pub use error::{AssetError, DecodeError, FetchError, StoreError};
pub use fallback::{fallback_model, fallback_texture};
pub use fetch::{AssetFetcher, HttpFetcher, DEFAULT_FETCH_TIMEOUT};
pub use handle::{AssetHandle, AssetId, ModelHandle, Origin, TextureHandle};
pub use instance::{Instance, InstanceId};
pub use key::CacheKey;
pub use mesh::{MeshAsset, MeshPrimitive};
pub use server::{AssetServer, CacheStats};
pub use store::{BlobStore, CacheEntry, FsBlobStore, MemoryBlobStore};
pub use texture::{TextureAsset, TextureFormat};
