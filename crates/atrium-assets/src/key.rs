use std::collections::BTreeMap;
use std::fmt;

/// Normalized identity of a requested asset variant: source identifier plus
/// variant parameters. Two requests with equal keys refer to the same
/// logical resource and share one pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a source identifier and its variant parameters.
    ///
    /// Parameters are iterated in sorted order (BTreeMap) and rendered with
    /// fixed precision, so logically equal requests always produce the same
    /// key regardless of how the caller assembled the map.
    pub fn new(source: &str, params: &BTreeMap<String, f64>) -> Self {
        let mut key = String::from(source);
        for (name, value) in params {
            key.push_str(&format!("|{}={:.6}", name, value));
        }
        CacheKey(key)
    }

    /// A key with no variant parameters.
    pub fn bare(source: &str) -> Self {
        CacheKey(source.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_equal_params_equal_keys() {
        let a = CacheKey::new("brick", &params(&[("u", 2.0), ("v", 2.0)]));
        let b = CacheKey::new("brick", &params(&[("v", 2.0), ("u", 2.0)]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_variant_isolation() {
        let a = CacheKey::new("brick", &params(&[("u", 2.0), ("v", 2.0)]));
        let b = CacheKey::new("brick", &params(&[("u", 4.0), ("v", 4.0)]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_bare_key_is_just_the_source() {
        assert_eq!(CacheKey::bare("dj_console").as_str(), "dj_console");
        assert_eq!(
            CacheKey::new("dj_console", &BTreeMap::new()),
            CacheKey::bare("dj_console")
        );
    }
}
