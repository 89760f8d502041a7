//! Cache keys shared by every tier, the refresh queue and the wire format.
//!
//! A key is `resource type + resource id + optional query`. Two string forms exist:
//!
//! - the *reference* form `character:123` or `market:search?item=5&world=2`, used on the
//!   wire and in logs, which keeps the canonical query so the resource can be refetched;
//! - the *storage* form `character:123` or `market:search:3f2a9c0d1e4b5a67`, used verbatim
//!   as the key in every tier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Number of hex characters of the query digest kept in storage keys.
const PARAMS_HASH_LEN: usize = 16;

/// Resource families served by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Character,
    Guild,
    Item,
    Market,
    News,
    Leaderboard,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Character,
        ResourceType::Guild,
        ResourceType::Item,
        ResourceType::Market,
        ResourceType::News,
        ResourceType::Leaderboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Character => "character",
            ResourceType::Guild => "guild",
            ResourceType::Item => "item",
            ResourceType::Market => "market",
            ResourceType::News => "news",
            ResourceType::Leaderboard => "leaderboard",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "character" => Ok(ResourceType::Character),
            "guild" => Ok(ResourceType::Guild),
            "item" => Ok(ResourceType::Item),
            "market" => Ok(ResourceType::Market),
            "news" => Ok(ResourceType::News),
            "leaderboard" => Ok(ResourceType::Leaderboard),
            _ => Err(CoreError::invalid_resource_type(s)),
        }
    }
}

/// Composite identifier of one cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey {
    resource_type: ResourceType,
    id: String,
    query: Option<String>,
}

impl CacheKey {
    /// Key for a plain resource lookup.
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self {
            resource_type,
            id,
            query: None,
        })
    }

    /// Key for a parameterised lookup such as a search.
    ///
    /// The query is canonicalised (empty pairs dropped, pairs sorted) so equivalent queries
    /// share one key.
    pub fn with_query(
        resource_type: ResourceType,
        id: impl Into<String>,
        query: &str,
    ) -> Result<Self, CoreError> {
        let mut key = Self::new(resource_type, id)?;
        key.query = canonical_query(query);
        Ok(key)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical query string, if this key is parameterised.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Truncated SHA-256 of the canonical query.
    pub fn params_hash(&self) -> Option<String> {
        self.query.as_ref().map(|q| {
            let digest = Sha256::digest(q.as_bytes());
            let mut encoded = hex::encode(digest);
            encoded.truncate(PARAMS_HASH_LEN);
            encoded
        })
    }

    /// Key used verbatim across all tiers.
    pub fn storage_key(&self) -> String {
        match self.params_hash() {
            Some(hash) => format!("{}:{}:{}", self.resource_type, self.id, hash),
            None => format!("{}:{}", self.resource_type, self.id),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

impl FromStr for CacheKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, query) = match s.split_once('?') {
            Some((head, query)) => (head, Some(query)),
            None => (s, None),
        };
        let (resource_type, id) = head
            .split_once(':')
            .ok_or_else(|| CoreError::invalid_key(format!("expected 'type:id', got '{s}'")))?;
        let resource_type = resource_type.parse::<ResourceType>()?;
        match query {
            Some(query) => CacheKey::with_query(resource_type, id, query),
            None => CacheKey::new(resource_type, id),
        }
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

fn validate_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::invalid_key("resource id must not be empty"));
    }
    if id
        .chars()
        .any(|c| c == ':' || c == '?' || c == '/' || c.is_whitespace())
    {
        return Err(CoreError::invalid_key(format!(
            "resource id '{id}' contains a reserved character"
        )));
    }
    Ok(())
}

fn canonical_query(query: &str) -> Option<String> {
    let mut pairs: Vec<&str> = query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_unstable();
    pairs.dedup();
    Some(pairs.join("&"))
}
