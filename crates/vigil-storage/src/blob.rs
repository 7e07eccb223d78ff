//! Blob store boundary consumed by the query engine and job manager.

use async_trait::async_trait;
use std::time::Duration;

use vigil_models::{AccessHandle, StorageRef};

use crate::error::{StorageError, StorageResult};

/// Longest lifetime a presigned handle may have (S3 SigV4 limit).
pub const MAX_ACCESS_HANDLE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default handle lifetime.
pub const DEFAULT_ACCESS_HANDLE_TTL: Duration = Duration::from_secs(3600);

/// Durable storage of media bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Issue a fresh time-limited read handle for `target`.
    ///
    /// Every call produces an independent handle; earlier handles are not
    /// consulted or revoked.
    async fn generate_access_handle(
        &self,
        target: &StorageRef,
        ttl: Duration,
    ) -> StorageResult<AccessHandle>;

    /// Whether the referenced object still exists.
    async fn exists(&self, target: &StorageRef) -> StorageResult<bool>;
}

/// Clamp a requested TTL into `(0, MAX_ACCESS_HANDLE_TTL]`.
pub fn effective_ttl(ttl: Duration) -> StorageResult<Duration> {
    if ttl.is_zero() {
        return Err(StorageError::InvalidTtl("ttl must be positive".to_string()));
    }
    Ok(ttl.min(MAX_ACCESS_HANDLE_TTL))
}

/// Validate an object key taken from a storage reference.
pub fn object_key(target: &StorageRef) -> StorageResult<&str> {
    let key = target.as_str().trim_start_matches('/');
    if key.trim().is_empty() {
        return Err(StorageError::invalid_key(target.as_str()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ttl() {
        assert!(effective_ttl(Duration::ZERO).is_err());
        assert_eq!(
            effective_ttl(Duration::from_secs(60)).unwrap(),
            Duration::from_secs(60)
        );
        assert_eq!(
            effective_ttl(Duration::from_secs(30 * 24 * 3600)).unwrap(),
            MAX_ACCESS_HANDLE_TTL
        );
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(&StorageRef::new("/videos/a.mp4")).unwrap(), "videos/a.mp4");
        assert!(object_key(&StorageRef::new("/")).is_err());
    }
}
