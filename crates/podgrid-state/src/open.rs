//! Store selection from a URL.

use std::path::Path;
use std::sync::Arc;

use crate::embedded::EmbeddedStore;
use crate::error::{StateError, StateResult};
use crate::redis_store::RedisStore;
use crate::store::SharedStore;

/// Open the store named by `url`.
///
/// - `redis://…` / `rediss://…` → [`RedisStore`]
/// - `memory` → in-memory [`EmbeddedStore`]
/// - `redb:///path/file.redb` or a bare path → on-disk [`EmbeddedStore`]
pub async fn open_url(url: &str) -> StateResult<SharedStore> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StateError::UnsupportedUrl(url.to_string()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisStore::connect(url).await?));
    }
    if url == "memory" {
        return Ok(Arc::new(EmbeddedStore::open_in_memory()?));
    }
    let path = url.strip_prefix("redb://").unwrap_or(url);
    if path.contains("://") {
        return Err(StateError::UnsupportedUrl(url.to_string()));
    }
    Ok(Arc::new(EmbeddedStore::open(Path::new(path))?))
}
