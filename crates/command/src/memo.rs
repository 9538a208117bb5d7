//! Bounded LRU result cache with a release hook.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// Default capacity for memoized registrations.
pub const DEFAULT_MEMO_CAPACITY: usize = 50;

type ReleaseFn<V> = dyn Fn(V) + Send + Sync;

/// Strict-LRU cache keyed by parameter.
///
/// Lookups refresh recency. Every value that leaves the cache (evicted,
/// replaced, invalidated or cleared) is handed to the release hook exactly
/// once, synchronously, before the call that displaced it returns. The hook
/// runs with the cache unlocked and may call back into it.
pub struct MemoCache<K, V> {
	entries: Mutex<LruCache<K, V>>,
	on_release: Option<Box<ReleaseFn<V>>>,
}

impl<K, V> MemoCache<K, V>
where
	K: Hash + Eq,
	V: Clone,
{
	/// Creates an empty cache holding at most `max_size` entries.
	///
	/// # Panics
	///
	/// Panics if `max_size` is zero.
	pub fn new(max_size: usize) -> Self {
		assert!(max_size > 0, "memo cache size must be > 0");
		let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
		Self {
			entries: Mutex::new(LruCache::new(capacity)),
			on_release: None,
		}
	}

	/// Sets the hook that receives every value leaving the cache.
	#[must_use]
	pub fn on_release(mut self, hook: impl Fn(V) + Send + Sync + 'static) -> Self {
		self.on_release = Some(Box::new(hook));
		self
	}

	/// Returns a clone of the cached value, marking it most recently used.
	pub fn get(&self, key: &K) -> Option<V> {
		self.entries.lock().get(key).cloned()
	}

	/// Returns true if `key` is cached, without touching recency.
	pub fn contains(&self, key: &K) -> bool {
		self.entries.lock().contains(key)
	}

	/// Stores a value, releasing whatever it displaces.
	pub fn insert(&self, key: K, value: V) {
		let displaced = self.entries.lock().push(key, value);
		if let Some((_, displaced)) = displaced {
			self.release(displaced);
		}
	}

	/// Drops one entry, releasing its value.
	pub fn invalidate(&self, key: &K) -> bool {
		let removed = self.entries.lock().pop(key);
		match removed {
			Some(value) => {
				self.release(value);
				true
			}
			None => false,
		}
	}

	/// Drops every entry, releasing each value in least-recently-used order.
	pub fn clear(&self) {
		let drained: Vec<V> = {
			let mut entries = self.entries.lock();
			std::iter::from_fn(|| entries.pop_lru().map(|(_, value)| value)).collect()
		};
		for value in drained {
			self.release(value);
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> usize {
		self.entries.lock().cap().get()
	}

	fn release(&self, value: V) {
		if let Some(hook) = &self.on_release {
			hook(value);
		}
	}
}

impl<K, V> Default for MemoCache<K, V>
where
	K: Hash + Eq,
	V: Clone,
{
	fn default() -> Self {
		Self::new(DEFAULT_MEMO_CAPACITY)
	}
}

impl<K, V> fmt::Debug for MemoCache<K, V>
where
	K: Hash + Eq,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let entries = self.entries.lock();
		f.debug_struct("MemoCache")
			.field("len", &entries.len())
			.field("capacity", &entries.cap())
			.field("has_release_hook", &self.on_release.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use proptest::prelude::*;

	use super::*;

	fn tracked(max_size: usize) -> (MemoCache<u32, String>, Arc<Mutex<Vec<String>>>) {
		let released = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&released);
		let cache = MemoCache::new(max_size).on_release(move |v: String| sink.lock().push(v));
		(cache, released)
	}

	#[test]
	fn evicts_least_recently_used_and_releases_it_once() {
		let (cache, released) = tracked(2);
		cache.insert(1, "one".into());
		cache.insert(2, "two".into());
		assert_eq!(cache.get(&1).as_deref(), Some("one"));

		cache.insert(3, "three".into());
		assert!(!cache.contains(&2));
		assert!(cache.contains(&1));
		assert_eq!(*released.lock(), vec!["two".to_string()]);
	}

	#[test]
	fn contains_does_not_refresh_recency() {
		let (cache, released) = tracked(2);
		cache.insert(1, "one".into());
		cache.insert(2, "two".into());
		assert!(cache.contains(&1));
		cache.insert(3, "three".into());
		assert_eq!(*released.lock(), vec!["one".to_string()]);
	}

	#[test]
	fn replacing_a_key_releases_the_old_value() {
		let (cache, released) = tracked(2);
		cache.insert(1, "old".into());
		cache.insert(1, "new".into());
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.get(&1).as_deref(), Some("new"));
		assert_eq!(*released.lock(), vec!["old".to_string()]);
	}

	#[test]
	fn invalidate_and_clear_release_removed_values() {
		let (cache, released) = tracked(4);
		for i in 0..3 {
			cache.insert(i, format!("v{i}"));
		}
		assert!(cache.invalidate(&1));
		assert!(!cache.invalidate(&1));
		cache.clear();
		assert!(cache.is_empty());
		assert_eq!(*released.lock(), vec!["v1".to_string(), "v0".to_string(), "v2".to_string()]);
	}

	#[test]
	fn release_hook_may_use_the_cache() {
		let lens = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&lens);
		let cache: Arc<MemoCache<u32, u32>> = Arc::new_cyclic(|this: &std::sync::Weak<MemoCache<u32, u32>>| {
			let this = this.clone();
			MemoCache::new(1).on_release(move |v: u32| {
				if let Some(cache) = this.upgrade() {
					sink.lock().push((v, cache.len()));
					cache.invalidate(&99);
				}
			})
		});

		cache.insert(1, 10);
		cache.insert(2, 20);
		cache.clear();
		assert_eq!(*lens.lock(), vec![(10, 1), (20, 0)]);
	}

	#[test]
	#[should_panic(expected = "memo cache size must be > 0")]
	fn zero_capacity_panics() {
		let _ = MemoCache::<u8, u8>::new(0);
	}

	#[derive(Debug, Clone)]
	enum Op {
		Get(u8),
		Insert(u8, u16),
	}

	fn op() -> impl Strategy<Value = Op> {
		prop_oneof![(0u8..8).prop_map(Op::Get), (0u8..8, any::<u16>()).prop_map(|(k, v)| Op::Insert(k, v)),]
	}

	proptest! {
		#[test]
		fn matches_a_recency_list_model(cap in 1usize..5, ops in proptest::collection::vec(op(), 0..96)) {
			let released = Arc::new(Mutex::new(Vec::new()));
			let sink = Arc::clone(&released);
			let cache = MemoCache::new(cap).on_release(move |v: u16| sink.lock().push(v));

			// Most recently used last.
			let mut model: Vec<(u8, u16)> = Vec::new();
			let mut expected_released = Vec::new();

			for op in ops {
				match op {
					Op::Get(k) => {
						let hit = model.iter().position(|(key, _)| *key == k);
						let expected = hit.map(|idx| {
							let entry = model.remove(idx);
							model.push(entry);
							entry.1
						});
						prop_assert_eq!(cache.get(&k), expected);
					}
					Op::Insert(k, v) => {
						if let Some(idx) = model.iter().position(|(key, _)| *key == k) {
							expected_released.push(model.remove(idx).1);
						} else if model.len() == cap {
							expected_released.push(model.remove(0).1);
						}
						model.push((k, v));
						cache.insert(k, v);
					}
				}
				prop_assert_eq!(cache.len(), model.len());
			}
			prop_assert_eq!(&*released.lock(), &expected_released);
		}
	}
}
