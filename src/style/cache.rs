//! Matching cache: (geometry kind, tag set, zoom) to resolved style list
//!
//! Adjacent features in a tile stream usually share tags (a long road split
//! into many segments), so the cache keeps the previous query per geometry
//! kind as an O(1) fast path in front of a bounded LRU keyed by canonical
//! tag signature. Zoom levels resolving to an identical style list share
//! one entry through a zoom bitmask instead of duplicating the list.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use once_cell::sync::Lazy;

use super::{zoom_mask, GeometryKind, RuleTree, Style, StyleList, Tag, TagSignature};
use crate::Result;

/// All empty results share one allocation
static EMPTY: Lazy<StyleList> = Lazy::new(|| Arc::from(Vec::<Arc<Style>>::new()));

/// Counters for cache behavior, readable per geometry kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Queries answered by the repeat-query fast path
    pub fast_hits: u64,
    /// Queries answered from the LRU cache
    pub cache_hits: u64,
    /// Full rule-tree walks
    pub misses: u64,
    /// Walks whose result merged into an existing entry via the zoom mask
    pub merges: u64,
    /// Signatures dropped by LRU eviction
    pub evictions: u64,
}

#[derive(Debug)]
struct Entry {
    zoom_mask: u32,
    styles: StyleList,
}

/// Snapshot of the previous query. Holds its own references, so LRU
/// eviction can never invalidate an in-flight fast path.
struct PrevQuery {
    /// identity of the last input slice, compared but never dereferenced
    raw: (usize, usize),
    tags: Vec<Tag>,
    zoom_mask: u32,
    styles: StyleList,
}

impl PrevQuery {
    fn new(tags: &[Tag], zoom_mask: u32, styles: StyleList) -> Self {
        Self {
            raw: (tags.as_ptr() as usize, tags.len()),
            tags: tags.to_vec(),
            zoom_mask,
            styles,
        }
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        self.raw == (tags.as_ptr() as usize, tags.len()) || self.tags == tags
    }
}

struct KindCache {
    cache: LruCache<TagSignature, Vec<Entry>>,
    prev: Option<PrevQuery>,
    stats: CacheStats,
}

impl KindCache {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(capacity),
            prev: None,
            stats: CacheStats::default(),
        }
    }

    /// Store a freshly walked result, preferring an existing entry: a
    /// racing thread may have resolved this zoom meanwhile, and a list that
    /// is pointer-identical to one cached for other zoom levels is merged
    /// by widening that entry's mask rather than duplicated.
    fn insert(&mut self, signature: TagSignature, mask: u32, styles: StyleList) -> (u32, StyleList) {
        if let Some(entries) = self.cache.get_mut(&signature) {
            if let Some(entry) = entries.iter().find(|e| e.zoom_mask & mask != 0) {
                return (entry.zoom_mask, entry.styles.clone());
            }
            if let Some(entry) = entries.iter_mut().find(|e| same_list(&e.styles, &styles)) {
                entry.zoom_mask |= mask;
                self.stats.merges += 1;
                return (entry.zoom_mask, entry.styles.clone());
            }
            entries.push(Entry {
                zoom_mask: mask,
                styles: styles.clone(),
            });
            return (mask, styles);
        }

        let entry = Entry {
            zoom_mask: mask,
            styles: styles.clone(),
        };
        if self.cache.push(signature, vec![entry]).is_some() {
            self.stats.evictions += 1;
        }
        (mask, styles)
    }
}

/// The style matching cache. One instance serves all loader threads; the
/// internal locks cover lookup and insertion only, never the rule walk.
pub struct StyleCache {
    rules: Arc<dyn RuleTree>,
    kinds: [Mutex<KindCache>; GeometryKind::COUNT],
}

impl StyleCache {
    /// `capacity` bounds the entries kept per geometry kind
    pub fn new(rules: Arc<dyn RuleTree>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(512).unwrap());
        Self {
            rules,
            kinds: std::array::from_fn(|_| Mutex::new(KindCache::new(capacity))),
        }
    }

    /// Resolve the ordered style list for a feature. Zoom levels at or
    /// beyond the mask width are rejected, never truncated. An empty list
    /// is a valid, cacheable result: the feature is invisible at this zoom.
    pub fn resolve(&self, kind: GeometryKind, tags: &[Tag], zoom: u8) -> Result<StyleList> {
        let mask = zoom_mask(zoom)?;
        let mut cache = self.lock(kind);

        // repeat-query fast path: slice identity first, tag compare second
        if let Some(prev) = &cache.prev {
            if prev.zoom_mask & mask != 0 && prev.matches(tags) {
                let styles = prev.styles.clone();
                cache.stats.fast_hits += 1;
                return Ok(styles);
            }
        }

        let signature = TagSignature::canonical(tags);
        if let Some(entries) = cache.cache.get(&signature) {
            if let Some(entry) = entries.iter().find(|e| e.zoom_mask & mask != 0) {
                let (entry_mask, styles) = (entry.zoom_mask, entry.styles.clone());
                cache.stats.cache_hits += 1;
                cache.prev = Some(PrevQuery::new(tags, entry_mask, styles.clone()));
                return Ok(styles);
            }
        }
        drop(cache);

        // full miss: walk the rule tree without holding the lock
        let mut matches = Vec::with_capacity(4);
        self.rules.match_styles(kind, tags, mask, &mut matches);
        dedup_identical(&mut matches);
        log::debug!(
            "style miss: kind {:?}, {} tags, zoom {} -> {} styles",
            kind,
            tags.len(),
            zoom,
            matches.len()
        );

        let styles: StyleList = if matches.is_empty() {
            EMPTY.clone()
        } else {
            Arc::from(matches)
        };

        let mut cache = self.lock(kind);
        cache.stats.misses += 1;
        let (entry_mask, styles) = cache.insert(signature, mask, styles);
        cache.prev = Some(PrevQuery::new(tags, entry_mask, styles.clone()));
        Ok(styles)
    }

    pub fn stats(&self, kind: GeometryKind) -> CacheStats {
        self.lock(kind).stats
    }

    /// Drop all cached entries and fast-path state
    pub fn clear(&self) {
        for slot in &self.kinds {
            let mut cache = slot.lock().unwrap_or_else(PoisonError::into_inner);
            cache.cache.clear();
            cache.prev = None;
        }
    }

    fn lock(&self, kind: GeometryKind) -> MutexGuard<'_, KindCache> {
        self.kinds[kind.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// True when both lists hold the same style instances in the same order
fn same_list(a: &StyleList, b: &StyleList) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| Arc::ptr_eq(x, y))
}

/// Overlapping rules can push the same style instance twice; keep the
/// first occurrence only.
fn dedup_identical(styles: &mut Vec<Arc<Style>>) {
    let mut i = 0;
    while i < styles.len() {
        let mut j = i + 1;
        while j < styles.len() {
            if Arc::ptr_eq(&styles[i], &styles[j]) {
                styles.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
}
