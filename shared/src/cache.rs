use std::fmt;
use std::num::NonZeroUsize;

use crate::model::{GeocodeResult, LatLng};

/// Positions closer than a micro-degree share an entry.
const KEY_SCALE: f64 = 1_000_000.0;

type CacheKey = (i64, i64);

#[allow(clippy::cast_possible_truncation)]
fn key(at: LatLng) -> CacheKey {
    ((at.lat * KEY_SCALE).round() as i64, (at.lng * KEY_SCALE).round() as i64)
}

/// Recently reverse-geocoded positions.
pub struct GeocodeCache {
    entries: lru::LruCache<CacheKey, GeocodeResult>,
}

impl GeocodeCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: lru::LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, at: LatLng) -> Option<GeocodeResult> {
        self.entries.get(&key(at)).cloned()
    }

    /// Keeps only results worth showing, so a failed lookup is retried on
    /// the next click.
    pub fn insert(&mut self, at: LatLng, result: &GeocodeResult) -> bool {
        if !result.is_displayable() {
            return false;
        }
        self.entries.put(key(at), result.clone());
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for GeocodeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodeCache")
            .field("len", &self.entries.len())
            .field("cap", &self.entries.cap())
            .finish()
    }
}
