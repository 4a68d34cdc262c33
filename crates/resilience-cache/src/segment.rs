//! A single cache shard: a map, an access-order arena, and the freshness
//! classification that drives the mandatory/sync/async reload decision.

use crate::entry::{Entry, EntryInner};
use crate::events::CacheEvent;
use crate::list::{AccessOrderList, SlotIndex};
use resilience_core::{EventListeners, MonotonicClock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The three configurable freshness horizons, all measured from an entry's
/// `written_at_millis`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FreshnessHorizons {
    pub(crate) expire_after_write: Option<Duration>,
    pub(crate) refresh_after_write: Option<Duration>,
    pub(crate) asynchronous_refresh_after_write: Option<Duration>,
}

impl FreshnessHorizons {
    fn is_hard_expired(&self, written_at_millis: u64, now: u64) -> bool {
        match self.expire_after_write {
            Some(d) => written_at_millis + d.as_millis() as u64 <= now,
            None => false,
        }
    }

    fn is_sync_refresh_wanted(&self, written_at_millis: u64, now: u64) -> bool {
        match self.refresh_after_write {
            Some(d) => written_at_millis + d.as_millis() as u64 <= now,
            None => false,
        }
    }

    fn is_async_refresh_wanted(&self, written_at_millis: u64, now: u64) -> bool {
        match self.asynchronous_refresh_after_write {
            Some(d) => written_at_millis + d.as_millis() as u64 <= now,
            None => false,
        }
    }
}

/// The action a `get` caller must take once the shard lock is released.
pub(crate) enum GetAction<K, V, E> {
    /// Serve `value` directly; no reload needed.
    Serve(V),
    /// No usable current value: join the owner's reload (or become the
    /// owner) and propagate any failure.
    MandatoryReload(Entry<K, V, E>),
    /// A current value exists; refresh in the background and serve it now.
    ServeAndEnqueue(Entry<K, V, E>, V),
    /// A current value exists but is past `refresh_after_write`; attempt a
    /// synchronous reload, falling back to the stale value on failure.
    ServeOrSyncRefresh(Entry<K, V, E>, V),
}

struct SegmentState<K, V, E> {
    map: HashMap<K, SlotIndex>,
    list: AccessOrderList<Entry<K, V, E>>,
}

pub(crate) struct CacheSegment<K, V, E>
where
    E: Send + Sync,
{
    state: Mutex<SegmentState<K, V, E>>,
    maximum_size: usize,
    horizons: FreshnessHorizons,
    clock: MonotonicClock,
    name: String,
    event_listeners: EventListeners<CacheEvent<E>>,
}

impl<K, V, E> CacheSegment<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Send + Sync,
{
    pub(crate) fn new(
        maximum_size: usize,
        horizons: FreshnessHorizons,
        name: String,
        event_listeners: EventListeners<CacheEvent<E>>,
    ) -> Self {
        Self {
            state: Mutex::new(SegmentState {
                map: HashMap::new(),
                list: AccessOrderList::new(),
            }),
            maximum_size,
            horizons,
            clock: MonotonicClock::new(),
            name,
            event_listeners,
        }
    }

    fn emit_eviction(&self) {
        self.event_listeners.emit(&CacheEvent::Eviction {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Looks up or creates the entry for `key`, applies the LRU touch and
    /// the freshness classification, and returns the action the caller
    /// should take outside the shard lock.
    pub(crate) fn get(&self, key: &K) -> GetAction<K, V, E> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(&index) = state.map.get(key) {
            let entry = state
                .list
                .get(index)
                .expect("map entry always points at a live list slot")
                .clone();

            let written = entry.written_at_millis();
            match written {
                None => {
                    state.list.move_to_head(index);
                    GetAction::MandatoryReload(entry)
                }
                Some(w) if self.horizons.is_hard_expired(w, now) => {
                    state.list.move_to_head(index);
                    GetAction::MandatoryReload(entry)
                }
                Some(w)
                    if self.horizons.is_sync_refresh_wanted(w, now)
                        || self.horizons.is_async_refresh_wanted(w, now) =>
                {
                    state.list.move_to_head(index);
                    let value = entry.current_value().expect("written_at_millis implies a value");
                    if self.horizons.is_sync_refresh_wanted(w, now) {
                        GetAction::ServeOrSyncRefresh(entry, value)
                    } else {
                        GetAction::ServeAndEnqueue(entry, value)
                    }
                }
                Some(_) => {
                    state.list.move_to_head(index);
                    GetAction::Serve(entry.current_value().expect("written_at_millis implies a value"))
                }
            }
        } else {
            let entry: Entry<K, V, E> = Arc::new(EntryInner::new(key.clone()));
            self.evict_to_fit(&mut state);
            let index = state.list.add_to_head(Arc::clone(&entry));
            state.map.insert(key.clone(), index);
            GetAction::MandatoryReload(entry)
        }
    }

    /// Looks up `key` without ever triggering a reload; returns `None` if
    /// absent or hard-expired.
    pub(crate) fn get_if_present(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let &index = state.map.get(key)?;
        let entry = state.list.get(index)?.clone();
        let written = entry.written_at_millis()?;
        if self.horizons.is_hard_expired(written, now) {
            return None;
        }
        state.list.move_to_head(index);
        entry.current_value()
    }

    fn evict_to_fit(&self, state: &mut SegmentState<K, V, E>) {
        if self.maximum_size == 0 {
            return;
        }
        while state.map.len() >= self.maximum_size {
            let Some((_, entry)) = state.list.remove_tail() else {
                break;
            };
            entry.mark_evicted();
            state.map.remove(&entry.key);
            self.emit_eviction();
        }
    }

    pub(crate) fn invalidate(&self, key: &K) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(index) = state.map.remove(key) else {
            return false;
        };
        if let Some(entry) = state.list.remove(index) {
            entry.mark_evicted();
        }
        true
    }

    pub(crate) fn invalidate_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.list.for_each(|entry| entry.mark_evicted());
        state.map.clear();
        state.list.clear();
    }

    /// Walks the access-order list, dropping hard-expired entries in place
    /// and collecting the rest that either need refresh or are requested
    /// unconditionally via `all`.
    pub(crate) fn collect_entries_to_refresh(&self, all: bool) -> Vec<Entry<K, V, E>> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();

        for index in state.list.indices() {
            let Some(entry) = state.list.get(index).cloned() else {
                continue;
            };
            match entry.written_at_millis() {
                Some(w) if self.horizons.is_hard_expired(w, now) => {
                    state.list.remove(index);
                    state.map.remove(&entry.key);
                    entry.mark_evicted();
                }
                Some(w) => {
                    if all
                        || self.horizons.is_sync_refresh_wanted(w, now)
                        || self.horizons.is_async_refresh_wanted(w, now)
                    {
                        out.push(entry);
                    }
                }
                None => {
                    if all {
                        out.push(entry);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ValueVersion;
    use std::thread;

    fn horizons(
        expire: Option<u64>,
        refresh: Option<u64>,
        async_refresh: Option<u64>,
    ) -> FreshnessHorizons {
        FreshnessHorizons {
            expire_after_write: expire.map(Duration::from_millis),
            refresh_after_write: refresh.map(Duration::from_millis),
            asynchronous_refresh_after_write: async_refresh.map(Duration::from_millis),
        }
    }

    fn segment(maximum_size: usize, horizons: FreshnessHorizons) -> CacheSegment<String, String, String> {
        CacheSegment::new(maximum_size, horizons, "test".to_string(), EventListeners::new())
    }

    fn load(segment: &CacheSegment<String, String, String>, key: &str) -> Entry<String, String, String> {
        match segment.get(&key.to_string()) {
            GetAction::MandatoryReload(entry) => entry,
            _ => panic!("expected a mandatory reload for a fresh key"),
        }
    }

    #[test]
    fn miss_creates_an_entry_and_requests_a_mandatory_reload() {
        let segment: CacheSegment<String, String, String> = segment(0, horizons(None, None, None));
        let entry = load(&segment, "a");
        assert!(!entry.has_current());
    }

    #[test]
    fn present_and_fresh_entry_is_served_directly() {
        let segment: CacheSegment<String, String, String> = segment(0, horizons(None, None, None));
        let entry = load(&segment, "a");
        entry.set_current(ValueVersion {
            value: "av".to_string(),
            written_at_millis: segment.clock.now_millis(),
        });
        match segment.get(&"a".to_string()) {
            GetAction::Serve(v) => assert_eq!(v, "av"),
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn hard_expired_entry_requires_a_mandatory_reload() {
        let segment: CacheSegment<String, String, String> =
            segment(0, horizons(Some(10), None, None));
        let entry = load(&segment, "a");
        let now = segment.clock.now_millis();
        entry.set_current(ValueVersion {
            value: "av".to_string(),
            written_at_millis: now.saturating_sub(20),
        });
        match segment.get(&"a".to_string()) {
            GetAction::MandatoryReload(_) => {}
            _ => panic!("expected MandatoryReload once hard-expired"),
        }
    }

    #[test]
    fn sync_refresh_wanted_serves_stale_value_and_requests_sync_refresh() {
        let segment: CacheSegment<String, String, String> =
            segment(0, horizons(Some(1000), Some(10), None));
        let entry = load(&segment, "a");
        let now = segment.clock.now_millis();
        entry.set_current(ValueVersion {
            value: "av".to_string(),
            written_at_millis: now.saturating_sub(20),
        });
        match segment.get(&"a".to_string()) {
            GetAction::ServeOrSyncRefresh(_, v) => assert_eq!(v, "av"),
            _ => panic!("expected ServeOrSyncRefresh"),
        }
    }

    #[test]
    fn async_refresh_wanted_serves_value_and_requests_background_refresh() {
        let segment: CacheSegment<String, String, String> =
            segment(0, horizons(Some(1000), Some(500), Some(10)));
        let entry = load(&segment, "a");
        let now = segment.clock.now_millis();
        entry.set_current(ValueVersion {
            value: "av".to_string(),
            written_at_millis: now.saturating_sub(20),
        });
        match segment.get(&"a".to_string()) {
            GetAction::ServeAndEnqueue(_, v) => assert_eq!(v, "av"),
            _ => panic!("expected ServeAndEnqueue"),
        }
    }

    #[test]
    fn get_if_present_never_triggers_a_reload_and_hides_hard_expired_entries() {
        let segment: CacheSegment<String, String, String> =
            segment(0, horizons(Some(10), None, None));
        assert!(segment.get_if_present(&"a".to_string()).is_none());

        let entry = load(&segment, "a");
        entry.set_current(ValueVersion {
            value: "av".to_string(),
            written_at_millis: segment.clock.now_millis(),
        });
        assert_eq!(segment.get_if_present(&"a".to_string()), Some("av".to_string()));

        thread::sleep(Duration::from_millis(20));
        assert!(segment.get_if_present(&"a".to_string()).is_none());
    }

    #[test]
    fn eviction_order_follows_lru_touch_rule() {
        let segment: CacheSegment<String, String, String> = segment(5, horizons(None, None, None));
        for i in 0..7 {
            load(&segment, &format!("a{i}"));
        }
        assert!(segment.get_if_present(&"a0".to_string()).is_none());
        assert!(segment.get_if_present(&"a1".to_string()).is_none());
        for i in 2..7 {
            load(&segment, &format!("a{i}"));
        }
    }

    #[test]
    fn invalidate_removes_the_entry_and_reports_prior_presence() {
        let segment: CacheSegment<String, String, String> = segment(0, horizons(None, None, None));
        load(&segment, "a");
        assert!(segment.invalidate(&"a".to_string()));
        assert!(!segment.invalidate(&"a".to_string()));
        assert!(segment.get_if_present(&"a".to_string()).is_none());
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let segment: CacheSegment<String, String, String> = segment(0, horizons(None, None, None));
        load(&segment, "a");
        load(&segment, "b");
        segment.invalidate_all();
        assert!(segment.get_if_present(&"a".to_string()).is_none());
        assert!(segment.get_if_present(&"b".to_string()).is_none());
    }

    #[test]
    fn refresh_sweep_drops_hard_expired_and_collects_sync_refresh_wanted() {
        let segment: CacheSegment<String, String, String> =
            segment(0, horizons(Some(1000), Some(500), None));
        let now = segment.clock.now_millis();

        let fresh = load(&segment, "fresh");
        fresh.set_current(ValueVersion {
            value: "fresh-v".to_string(),
            written_at_millis: now,
        });

        // Written 700ms "ago": past the 500ms refresh horizon but not yet
        // past the 1000ms hard-expire horizon.
        let stale = load(&segment, "stale");
        stale.set_current(ValueVersion {
            value: "stale-v".to_string(),
            written_at_millis: now.saturating_sub(700),
        });

        // Written 1500ms "ago": already past the hard-expire horizon, so it
        // is dropped by the sweep rather than collected.
        let ancient = load(&segment, "ancient");
        ancient.set_current(ValueVersion {
            value: "ancient-v".to_string(),
            written_at_millis: now.saturating_sub(1500),
        });
        assert!(segment.get_if_present(&"ancient".to_string()).is_none());

        let collected = segment.collect_entries_to_refresh(false);
        let keys: Vec<_> = collected.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec!["stale".to_string()]);
        assert!(!segment.invalidate(&"ancient".to_string()));
    }
}
