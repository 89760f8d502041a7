//! Contracts for the authoritative upstream source.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OriginError;
use crate::key::CacheKey;
use crate::record::NormalizedRecord;

/// Fetches one resource from the upstream and normalizes it.
///
/// Implementations perform exactly one upstream call per invocation; deduplication of
/// concurrent calls for the same key happens above this trait.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<NormalizedRecord, OriginError>;
}

/// Maps an upstream body onto a local record.
///
/// The per-resource normalizers plug in here.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, key: &CacheKey, body: Value) -> Result<NormalizedRecord, OriginError>;
}

/// Keeps the upstream body as-is.
///
/// Dependencies are read from an optional top-level `links` array of reference strings
/// (`"guild:77"`); unparseable links are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughNormalizer;

impl Normalizer for PassthroughNormalizer {
    fn normalize(&self, key: &CacheKey, body: Value) -> Result<NormalizedRecord, OriginError> {
        let dependencies = body
            .get("links")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|link| link.parse::<CacheKey>().ok())
                    .filter(|link| link != key)
                    .collect()
            })
            .unwrap_or_default();
        Ok(NormalizedRecord::new(key.clone(), body).with_dependencies(dependencies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ResourceType;
    use serde_json::json;

    #[test]
    fn test_passthrough_reads_links() {
        let key = CacheKey::new(ResourceType::Character, "1").unwrap();
        let body = json!({
            "name": "Ayla",
            "links": ["guild:77", "not a key", "character:1", 42]
        });
        let record = PassthroughNormalizer.normalize(&key, body.clone()).unwrap();
        assert_eq!(record.data, body);
        assert_eq!(
            record.dependencies,
            vec![CacheKey::new(ResourceType::Guild, "77").unwrap()]
        );
    }

    #[test]
    fn test_passthrough_without_links() {
        let key = CacheKey::new(ResourceType::News, "latest").unwrap();
        let record = PassthroughNormalizer.normalize(&key, json!([1, 2])).unwrap();
        assert!(record.dependencies.is_empty());
    }
}
