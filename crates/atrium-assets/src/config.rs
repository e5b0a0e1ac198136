//! Request configuration structs.
//!
//! Every recognized field is enumerated explicitly; JSON configs with
//! unknown fields or non-finite parameter values are rejected as
//! `AssetError::Config` before any I/O happens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AssetError;
use crate::key::CacheKey;

/// Variant parameters for a texture request, e.g. tiling factors.
/// Distinct parameters produce distinct cache keys and distinct pool
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextureParams {
    #[serde(default)]
    pub variant: BTreeMap<String, f64>,
}

impl TextureParams {
    /// Convenience constructor for the common tiling case.
    pub fn tiling(u: f64, v: f64) -> Self {
        let mut variant = BTreeMap::new();
        variant.insert("u".to_string(), u);
        variant.insert("v".to_string(), v);
        Self { variant }
    }

    /// Parse from JSON, rejecting unknown fields and malformed values.
    pub fn from_json(json: &str) -> Result<Self, AssetError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| AssetError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub(crate) fn validate(&self) -> Result<(), AssetError> {
        validate_params(&self.variant)
    }

    pub(crate) fn cache_key(&self, source_locator: &str) -> CacheKey {
        CacheKey::new(source_locator, &self.variant)
    }
}

/// Configuration for a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Where to fetch the asset bytes from.
    pub source_locator: String,
    /// Variant parameters folded into the cache key.
    #[serde(default)]
    pub variant_params: BTreeMap<String, f64>,
    /// When set, skip the network entirely and build the procedural
    /// stand-in directly.
    #[serde(default)]
    pub use_procedural: bool,
}

impl ModelConfig {
    /// A config that fetches from the given locator.
    pub fn new(source_locator: impl Into<String>) -> Self {
        Self {
            source_locator: source_locator.into(),
            variant_params: BTreeMap::new(),
            use_procedural: false,
        }
    }

    /// A config that always takes the procedural path.
    pub fn procedural() -> Self {
        Self {
            source_locator: String::new(),
            variant_params: BTreeMap::new(),
            use_procedural: true,
        }
    }

    /// Parse from JSON, rejecting unknown fields and malformed values.
    pub fn from_json(json: &str) -> Result<Self, AssetError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AssetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), AssetError> {
        if !self.use_procedural && self.source_locator.is_empty() {
            return Err(AssetError::Config(
                "source_locator is required unless use_procedural is set".to_string(),
            ));
        }
        validate_params(&self.variant_params)
    }

    /// The cache key is rooted at the model's logical id, so instances can
    /// be created from the same id the model was loaded under.
    pub(crate) fn cache_key(&self, model_id: &str) -> CacheKey {
        CacheKey::new(model_id, &self.variant_params)
    }
}

fn validate_params(params: &BTreeMap<String, f64>) -> Result<(), AssetError> {
    for (name, value) in params {
        if name.is_empty() {
            return Err(AssetError::Config(
                "variant parameter names must be non-empty".to_string(),
            ));
        }
        if !value.is_finite() {
            return Err(AssetError::Config(format!(
                "variant parameter '{}' is not a finite number",
                name
            )));
        }
    }
    Ok(())
}
