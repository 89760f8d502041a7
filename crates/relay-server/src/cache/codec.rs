//! MessagePack encoding of normalized records for storage in every tier.

use std::sync::Arc;

use relay_core::NormalizedRecord;
use relay_storage::Payload;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode cached record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode cached record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub fn encode_record(record: &NormalizedRecord) -> Result<Payload, CodecError> {
    Ok(Arc::new(rmp_serde::to_vec_named(record)?))
}

pub fn decode_record(bytes: &[u8]) -> Result<NormalizedRecord, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{CacheKey, ResourceType};
    use serde_json::json;

    #[test]
    fn test_record_survives_storage_encoding() {
        let key = CacheKey::with_query(ResourceType::Market, "search", "world=2&item=5").unwrap();
        let record = NormalizedRecord::new(key, json!({"listings": [{"price": 12.5}], "total": 1}))
            .with_dependencies(vec![CacheKey::new(ResourceType::Item, "5").unwrap()]);

        let bytes = encode_record(&record).unwrap();
        let decoded = decode_record(&bytes).unwrap();

        assert_eq!(decoded.key, record.key);
        assert_eq!(decoded.data, record.data);
        assert_eq!(decoded.dependencies, record.dependencies);
        assert_eq!(decoded.fetched_at.unix_timestamp(), record.fetched_at.unix_timestamp());
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            decode_record(&[0xc1, 0x00]),
            Err(CodecError::Decode(_))
        ));
    }
}
