use thiserror::Error;

/// Errors surfaced to callers of the asset server.
///
/// Only these two variants ever cross the facade boundary: they indicate a
/// programming error in the caller, not an environmental condition. Network
/// and decode failures are recovered internally via the fallback generator
/// and are never returned from `load_texture`/`load_model`.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset configuration: {0}")]
    Config(String),

    #[error("no loaded resource for key '{0}'")]
    NotLoaded(String),
}

/// A failed remote retrieval. Routed to the fallback generator, never to
/// the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status})")]
    Status { status: u16 },

    #[error("remote is offline or unreachable")]
    Offline,

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Offline
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Bytes that do not parse as the expected asset format. Routed to the
/// fallback generator, never to the caller.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(String),

    #[error("failed to decode glTF: {0}")]
    Gltf(String),

    #[error("glTF document contains no meshes")]
    EmptyDocument,
}

/// Persistent store failures. A failing store degrades to a no-op for the
/// rest of the session; these never propagate past the store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
