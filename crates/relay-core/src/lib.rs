pub mod error;
pub mod key;
pub mod origin;
pub mod record;

pub use error::{CoreError, OriginError, Result};
pub use key::{CacheKey, ResourceType};
pub use origin::{Normalizer, OriginFetcher, PassthroughNormalizer};
pub use record::{ChangeSet, NormalizedRecord, ROOT_SECTION};
