//! Content-addressed job cache with LRU eviction.

pub mod content_cache;
pub mod key;

pub use content_cache::{
    CacheEntry, CacheStats, ContentAddressedCache, JobStatus, Reservation, ReservationId,
};
pub use key::HashKey;
