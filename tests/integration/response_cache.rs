//! Response cache: LRU eviction by access, TTL, persistence of the file index.

use conduit::cache::{
    cache_key, open_cache, CacheBackendKind, CacheSettings, FileCacheOptions, FileResponseCache,
    MemoryResponseCache, ResponseCache,
};
use conduit::clock::{ManualClock, SharedClock};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tempfile::TempDir;

fn ten(c: char) -> String {
    c.to_string().repeat(10)
}

fn file_cache(dir: &TempDir, clock: SharedClock) -> FileResponseCache {
    FileResponseCache::open(
        dir.path(),
        clock,
        FileCacheOptions {
            max_size_bytes: 30,
            default_ttl: Duration::from_secs(3600),
            eviction_ratio: 0.0,
        },
    )
    .unwrap()
}

#[test]
fn memory_cache_evicts_least_recently_accessed() {
    let clock = ManualClock::starting_now();
    let cache = MemoryResponseCache::new(clock.clone(), Duration::from_secs(60), 2);
    cache.set("a", "A", None, Map::new()).unwrap();
    cache.set("b", "B", None, Map::new()).unwrap();
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("A"));
    cache.set("c", "C", None, Map::new()).unwrap();

    assert!(cache.get("b").unwrap().is_none());
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("A"));
    assert_eq!(cache.get("c").unwrap().as_deref(), Some("C"));
    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn file_cache_evicts_by_access_not_creation() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let cache = file_cache(&dir, clock.clone());
    cache.set("key-a", &ten('a'), None, Map::new()).unwrap();
    cache.set("key-b", &ten('b'), None, Map::new()).unwrap();
    cache.set("key-c", &ten('c'), None, Map::new()).unwrap();
    cache.get("key-a").unwrap();

    cache.set("key-d", &ten('d'), None, Map::new()).unwrap();

    assert!(cache.get("key-b").unwrap().is_none());
    assert_eq!(cache.get("key-a").unwrap(), Some(ten('a')));
    assert_eq!(cache.get("key-d").unwrap(), Some(ten('d')));
    let stats = cache.stats();
    assert_eq!(stats.total_size_bytes, 30);
    assert_eq!(stats.evictions, 1);
}

#[test]
fn file_cache_with_default_ratio_evicts_the_least_recently_read() {
    let dir = TempDir::new().unwrap();
    let cache = FileResponseCache::open(
        dir.path(),
        ManualClock::starting_now(),
        FileCacheOptions {
            max_size_bytes: 20,
            ..FileCacheOptions::default()
        },
    )
    .unwrap();
    cache.set("key-a", &ten('a'), None, Map::new()).unwrap();
    cache.set("key-b", &ten('b'), None, Map::new()).unwrap();
    cache.get("key-a").unwrap();

    cache.set("key-c", &ten('c'), None, Map::new()).unwrap();

    assert!(cache.get("key-b").unwrap().is_none());
    assert_eq!(cache.get("key-a").unwrap(), Some(ten('a')));
    assert_eq!(cache.get("key-c").unwrap(), Some(ten('c')));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn file_cache_index_and_recency_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    {
        let cache = file_cache(&dir, clock.clone());
        cache.set("key-a", &ten('a'), None, Map::new()).unwrap();
        cache.set("key-b", &ten('b'), None, Map::new()).unwrap();
        cache.set("key-c", &ten('c'), None, Map::new()).unwrap();
        cache.get("key-a").unwrap();
    }

    let reopened = file_cache(&dir, clock.clone());
    assert_eq!(reopened.stats().entries, 3);
    reopened.set("key-d", &ten('d'), None, Map::new()).unwrap();
    assert!(reopened.get("key-b").unwrap().is_none());
    assert_eq!(reopened.get("key-a").unwrap(), Some(ten('a')));
}

#[test]
fn expired_entries_are_misses_and_dropped_on_reopen() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let cache = file_cache(&dir, clock.clone());
    cache
        .set("short", "brief", Some(Duration::from_secs(5)), Map::new())
        .unwrap();
    cache.set("long", "lasting", None, Map::new()).unwrap();
    clock.advance(Duration::from_secs(10));

    let reopened = file_cache(&dir, clock.clone());
    assert_eq!(reopened.stats().entries, 1);
    assert!(cache.get("short").unwrap().is_none());
    assert_eq!(reopened.get("long").unwrap().as_deref(), Some("lasting"));
}

#[test]
fn oversized_response_is_skipped() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir, ManualClock::starting_now());
    cache.set("huge", &"x".repeat(31), None, Map::new()).unwrap();
    assert!(cache.get("huge").unwrap().is_none());
    assert_eq!(cache.stats().entries, 0);
}

#[test]
fn clear_and_invalidate_remove_entries() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir, ManualClock::starting_now());
    cache.set("key-a", "1", None, Map::new()).unwrap();
    cache.set("key-b", "2", None, Map::new()).unwrap();
    assert!(cache.invalidate("key-a").unwrap());
    assert!(!cache.invalidate("key-a").unwrap());
    assert_eq!(cache.clear().unwrap(), 1);
    assert_eq!(cache.stats().entries, 0);
}

#[test]
fn lookup_ignores_parameter_order() {
    let cache = MemoryResponseCache::new(ManualClock::starting_now(), Duration::from_secs(60), 10);
    let mut first = Map::new();
    first.insert("temperature".to_string(), json!(0.2));
    first.insert("max_tokens".to_string(), json!(512));
    let mut second = Map::new();
    second.insert("max_tokens".to_string(), json!(512));
    second.insert("temperature".to_string(), json!(0.2));

    cache
        .store("explain the bug", "gpt-4o", &first, "answer", None)
        .unwrap();
    assert_eq!(
        cache.lookup("explain the bug", "gpt-4o", &second).unwrap().as_deref(),
        Some("answer")
    );
    assert!(cache.lookup("explain the bug", "gpt-4o-mini", &second).unwrap().is_none());
    assert_eq!(
        cache_key("p", "m", &first),
        cache_key("p", "m", &second)
    );
    assert_ne!(
        cache_key("p", "m", &first),
        cache_key("p", "m", &Map::<String, Value>::new())
    );
}

#[test]
fn disabled_cache_is_not_opened() {
    let settings = CacheSettings {
        enabled: false,
        ..CacheSettings::default()
    };
    assert!(open_cache(&settings, None, ManualClock::starting_now()).is_none());

    let memory = CacheSettings {
        backend: CacheBackendKind::Memory,
        ..CacheSettings::default()
    };
    let cache = open_cache(&memory, None, ManualClock::starting_now()).unwrap();
    assert_eq!(cache.stats().backend, "memory");
}
