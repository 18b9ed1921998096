//! HashTable: chained {key, yield} multimap with pluggable hash functions.
//!
//! Items live in a generational arena and are threaded into per-bucket
//! doubly-linked chains by arena key. New items are prepended, so within a
//! bucket the most recently inserted item comes first.

use crate::config::{normalize_bucket_count, TableOptions, MAX_BUCKETS};
use crate::error::{HashTableError, Result};
use crate::object::{HashObject, ObjectType};
use crate::strategy::{HashFunction, HashStrategy};
use core::fmt;
use core::ops::Range;
use log::{debug, info};
use slotmap::{DefaultKey, SlotMap};
use std::borrow::Cow;

/// Stable reference to one stored item.
///
/// Handles survive [`HashTable::rebuild`]; once the item is removed the
/// handle resolves to `None`, even if the arena slot is reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ItemHandle(DefaultKey);

impl ItemHandle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        ItemHandle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }

    pub fn key<'t, 'a, K, Y, S>(&self, table: &'t HashTable<'a, K, Y, S>) -> Option<&'t K>
    where
        K: HashObject,
        Y: HashObject,
        S: HashStrategy,
    {
        table.item(*self).map(|(k, _)| k)
    }

    pub fn yield_value<'t, 'a, K, Y, S>(&self, table: &'t HashTable<'a, K, Y, S>) -> Option<&'t Y>
    where
        K: HashObject,
        Y: HashObject,
        S: HashStrategy,
    {
        table.item(*self).map(|(_, y)| y)
    }

    /// Mutable access to the yield. A borrowed yield is first copied into
    /// the table so the caller's value is never modified.
    ///
    /// The table does not re-check uniqueness after the write: rewriting a
    /// yield to equal another yield under the same key leaves a duplicate
    /// {key, yield} pair, and keeping pairs unique is up to the caller.
    pub fn yield_mut<'t, 'a, K, Y, S>(
        &self,
        table: &'t mut HashTable<'a, K, Y, S>,
    ) -> Option<&'t mut Y>
    where
        K: HashObject,
        Y: HashObject,
        S: HashStrategy,
    {
        table
            .items
            .get_mut(self.raw_handle())
            .map(|item| item.yld.to_mut())
    }

    /// Bucket the item currently lives in.
    pub fn bucket<K, Y, S>(&self, table: &HashTable<'_, K, Y, S>) -> Option<usize>
    where
        K: HashObject,
        Y: HashObject,
        S: HashStrategy,
    {
        table.items.get(self.raw_handle()).map(|item| item.h)
    }
}

struct Item<'a, K: HashObject, Y: HashObject> {
    key: Cow<'a, K>,
    yld: Cow<'a, Y>,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
    h: usize,
}

impl<'a, K: HashObject, Y: HashObject> Item<'a, K, Y> {
    fn matches(&self, key: Option<&K>, yld: Option<&Y>) -> bool {
        key.map_or(true, |k| k.same_as(&self.key)) && yld.map_or(true, |y| y.same_as(&self.yld))
    }
}

/// Walks one bucket chain head to tail.
struct Chain<'t, 'a, K: HashObject, Y: HashObject> {
    items: &'t SlotMap<DefaultKey, Item<'a, K, Y>>,
    cur: Option<DefaultKey>,
}

impl<'t, 'a, K: HashObject, Y: HashObject> Iterator for Chain<'t, 'a, K, Y> {
    type Item = (DefaultKey, &'t Item<'a, K, Y>);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.cur?;
        let item = &self.items[k];
        self.cur = item.next;
        Some((k, item))
    }
}

/// Chained multimap from keys of type `K` to yields of type `Y`.
///
/// With `copy_keys`/`copy_yields` set the table stores its own copies;
/// otherwise it stores references that must outlive `'a` and are never
/// dropped by the table.
pub struct HashTable<'a, K: HashObject, Y: HashObject, S = HashFunction> {
    strategy: S,
    buckets: Vec<Option<DefaultKey>>,
    mask: usize,
    items: SlotMap<DefaultKey, Item<'a, K, Y>>,
    copy_keys: bool,
    copy_yields: bool,
    max_occupancy_ratio: f32,
}

fn alloc_buckets(n: usize) -> Result<Vec<Option<DefaultKey>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(n)
        .map_err(|_| HashTableError::AllocationFailure { requested: n })?;
    buckets.resize(n, None);
    Ok(buckets)
}

impl<'a, K, Y, S> HashTable<'a, K, Y, S>
where
    K: HashObject,
    Y: HashObject,
    S: HashStrategy,
{
    /// Creates a table bound to `strategy`.
    ///
    /// The bucket hint is rounded down to a power of two, at least 16.
    pub fn init(strategy: S, options: TableOptions) -> Result<Self> {
        options.validate()?;
        let nbuckets = normalize_bucket_count(options.bucket_hint);
        let buckets = alloc_buckets(nbuckets)?;
        debug!(
            "hash table initialized: {} -> {} with {} buckets",
            K::TYPE,
            Y::TYPE,
            nbuckets
        );
        Ok(Self {
            strategy,
            buckets,
            mask: nbuckets - 1,
            items: SlotMap::with_key(),
            copy_keys: options.copy_keys,
            copy_yields: options.copy_yields,
            max_occupancy_ratio: options.max_occupancy_ratio,
        })
    }

    pub fn new(strategy: S) -> Result<Self> {
        Self::init(strategy, TableOptions::default())
    }

    /// Removes every item and releases the bucket array.
    pub fn destroy(mut self) {
        self.reset();
        debug!("hash table destroyed ({} buckets)", self.buckets.len());
    }

    /// Removes every item; the bucket array keeps its size.
    pub fn reset(&mut self) {
        let _ = self.remove(None, None);
    }

    /// Re-threads every item into a new bucket array of `nbuckets`
    /// (normalized like the initial hint). Items and handles are preserved.
    pub fn rebuild(&mut self, nbuckets: usize) -> Result<()> {
        let nbuckets = normalize_bucket_count(nbuckets);
        info!(
            "resizing hash table ({} -> {} buckets)",
            self.buckets.len(),
            nbuckets
        );
        let mut buckets = alloc_buckets(nbuckets)?;
        let mask = nbuckets - 1;

        for b in 0..self.buckets.len() {
            let mut cur = self.buckets[b];
            while let Some(k) = cur {
                let item = &self.items[k];
                cur = item.next;
                let h = self.strategy.hash_bytes(&item.key.marshal()) as usize & mask;
                let head = buckets[h];
                let item = &mut self.items[k];
                item.prev = None;
                item.h = h;
                item.next = head;
                if let Some(old) = head {
                    self.items[old].prev = Some(k);
                }
                buckets[h] = Some(k);
            }
        }

        self.buckets = buckets;
        self.mask = mask;
        Ok(())
    }

    /// First item matching `{key, yld}`; `None` filters match anything.
    pub fn lookup(&self, key: Option<&K>, yld: Option<&Y>) -> Option<ItemHandle> {
        self.bucket_range(key).find_map(|b| {
            self.chain(b)
                .find(|(_, item)| item.matches(key, yld))
                .map(|(k, _)| ItemHandle::new(k))
        })
    }

    /// Cursor iteration.
    ///
    /// Without `item`, returns the first item of the key's bucket that
    /// matches `key` (or the first item of the table when `key` is `None`).
    /// With `item`, returns its chain successor if that matches `key`; a
    /// non-matching successor ends the iteration. When the chain is
    /// exhausted, a wildcard walk continues into the following buckets while
    /// a keyed walk stops. Pass the same `key` for a whole iteration.
    pub fn get_next(&self, item: Option<ItemHandle>, key: Option<&K>) -> Option<ItemHandle> {
        let start = match item {
            None => match key {
                None => 0,
                Some(k) => self.bucket_of(k),
            },
            Some(handle) => {
                let current = self.items.get(handle.raw_handle())?;
                if let Some(next) = current.next {
                    return match key {
                        Some(k) if !k.same_as(&self.items[next].key) => None,
                        _ => Some(ItemHandle::new(next)),
                    };
                }
                if key.is_some() {
                    return None;
                }
                current.h + 1
            }
        };

        match key {
            None => (start..self.buckets.len())
                .find_map(|b| self.buckets[b])
                .map(ItemHandle::new),
            Some(k) => self
                .chain(start)
                .find(|(_, it)| k.same_as(&it.key))
                .map(|(k, _)| ItemHandle::new(k)),
        }
    }

    /// Number of items reached by a `get_next` walk for `key`.
    pub fn get_entries(&self, key: Option<&K>) -> usize {
        let mut count = 0;
        let mut cur = self.get_next(None, key);
        while let Some(handle) = cur {
            count += 1;
            cur = self.get_next(Some(handle), key);
        }
        count
    }

    pub fn exists(&self, key: Option<&K>, yld: Option<&Y>) -> bool {
        self.lookup(key, yld).is_some()
    }

    /// Inserts `{key, yld}`, copying or referencing each per the table's
    /// copy flags. Fails without side effects if the pair is already stored.
    pub fn insert(&mut self, key: &'a K, yld: &'a Y) -> Result<ItemHandle> {
        if self.exists(Some(key), Some(yld)) {
            return Err(HashTableError::DuplicateEntry);
        }
        let key = if self.copy_keys {
            Cow::Owned(key.clone())
        } else {
            Cow::Borrowed(key)
        };
        let yld = if self.copy_yields {
            Cow::Owned(yld.clone())
        } else {
            Cow::Borrowed(yld)
        };
        self.link(key, yld)
    }

    /// Inserts `{key, yld}` by moving both into the table.
    pub fn insert_owned(&mut self, key: K, yld: Y) -> Result<ItemHandle> {
        if self.exists(Some(&key), Some(&yld)) {
            return Err(HashTableError::DuplicateEntry);
        }
        self.link(Cow::Owned(key), Cow::Owned(yld))
    }

    fn link(&mut self, key: Cow<'a, K>, yld: Cow<'a, Y>) -> Result<ItemHandle> {
        self.grow_if_needed()?;
        let h = self.bucket_of(&key);
        let head = self.buckets[h];
        let k = self.items.insert(Item {
            key,
            yld,
            prev: None,
            next: head,
            h,
        });
        if let Some(old) = head {
            self.items[old].prev = Some(k);
        }
        self.buckets[h] = Some(k);
        Ok(ItemHandle::new(k))
    }

    /// Doubles while the current entries reach the occupancy ratio; runs
    /// before the new item is linked.
    fn grow_if_needed(&mut self) -> Result<()> {
        while self.over_occupied(self.items.len()) {
            let current = self.buckets.len();
            if current >= MAX_BUCKETS {
                info!("hash table at maximum size ({} buckets); not growing", current);
                break;
            }
            self.rebuild(current * 2)?;
        }
        Ok(())
    }

    fn over_occupied(&self, entries: usize) -> bool {
        entries as f64 >= f64::from(self.max_occupancy_ratio) * self.buckets.len() as f64
    }

    /// Removes every item matching `{key, yld}` and returns how many.
    pub fn remove(&mut self, key: Option<&K>, yld: Option<&Y>) -> usize {
        let mut removed = 0;
        for b in self.bucket_range(key) {
            let mut cur = self.buckets[b];
            while let Some(k) = cur {
                let item = &self.items[k];
                cur = item.next;
                if item.matches(key, yld) {
                    self.unlink(k);
                    self.items.remove(k);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Removes one item in O(1), handing back its key and yield.
    pub fn remove_item(&mut self, handle: ItemHandle) -> Option<(Cow<'a, K>, Cow<'a, Y>)> {
        let k = handle.raw_handle();
        if !self.items.contains_key(k) {
            return None;
        }
        self.unlink(k);
        let item = self.items.remove(k)?;
        Some((item.key, item.yld))
    }

    fn unlink(&mut self, k: DefaultKey) {
        let (prev, next, h) = {
            let item = &self.items[k];
            (item.prev, item.next, item.h)
        };
        match prev {
            Some(p) => self.items[p].next = next,
            None => self.buckets[h] = next,
        }
        if let Some(n) = next {
            self.items[n].prev = prev;
        }
    }

    fn bucket_of(&self, key: &K) -> usize {
        self.strategy.hash_bytes(&key.marshal()) as usize & self.mask
    }

    fn bucket_range(&self, key: Option<&K>) -> Range<usize> {
        match key {
            None => 0..self.buckets.len(),
            Some(k) => {
                let h = self.bucket_of(k);
                h..h + 1
            }
        }
    }

    fn chain(&self, bucket: usize) -> Chain<'_, 'a, K, Y> {
        Chain {
            items: &self.items,
            cur: self.buckets[bucket],
        }
    }

    pub fn item(&self, handle: ItemHandle) -> Option<(&K, &Y)> {
        self.items
            .get(handle.raw_handle())
            .map(|item| (&*item.key, &*item.yld))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Alias of [`len`](Self::len).
    pub fn entries(&self) -> usize {
        self.items.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn mask(&self) -> usize {
        self.mask
    }

    pub fn load_factor(&self) -> f64 {
        self.items.len() as f64 / self.buckets.len() as f64
    }

    pub fn max_occupancy_ratio(&self) -> f32 {
        self.max_occupancy_ratio
    }

    pub fn copies_keys(&self) -> bool {
        self.copy_keys
    }

    pub fn copies_yields(&self) -> bool {
        self.copy_yields
    }

    pub fn key_type(&self) -> ObjectType {
        K::TYPE
    }

    pub fn yield_type(&self) -> ObjectType {
        Y::TYPE
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Number of items chained in `bucket`; 0 past the end.
    pub fn chain_len(&self, bucket: usize) -> usize {
        if bucket >= self.buckets.len() {
            return 0;
        }
        self.chain(bucket).count()
    }

    /// Every item, lowest bucket first and head to tail within a bucket.
    pub fn iter(&self) -> Iter<'_, 'a, K, Y, S> {
        Iter {
            table: self,
            cursor: None,
            done: false,
        }
    }
}

impl<'a, K, Y, S> fmt::Debug for HashTable<'a, K, Y, S>
where
    K: HashObject,
    Y: HashObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("key_type", &K::TYPE)
            .field("yield_type", &Y::TYPE)
            .field("buckets", &self.buckets.len())
            .field("entries", &self.items.len())
            .field("copy_keys", &self.copy_keys)
            .field("copy_yields", &self.copy_yields)
            .field("max_occupancy_ratio", &self.max_occupancy_ratio)
            .finish()
    }
}

/// Iterator over all items of a [`HashTable`], driven by `get_next`.
pub struct Iter<'t, 'a, K: HashObject, Y: HashObject, S> {
    table: &'t HashTable<'a, K, Y, S>,
    cursor: Option<ItemHandle>,
    done: bool,
}

impl<'t, 'a, K, Y, S> Iterator for Iter<'t, 'a, K, Y, S>
where
    K: HashObject,
    Y: HashObject,
    S: HashStrategy,
{
    type Item = (ItemHandle, &'t K, &'t Y);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.table.get_next(self.cursor, None) {
            Some(handle) => {
                self.cursor = Some(handle);
                let item = &self.table.items[handle.raw_handle()];
                Some((handle, &*item.key, &*item.yld))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionInfo};
    use crate::object::UnsignedInt;
    use crate::strategy::Lcg;

    /// Sends every key to bucket 0.
    struct ConstStrategy;
    impl HashStrategy for ConstStrategy {
        fn hash_bytes(&self, _bytes: &[u8]) -> u32 {
            0
        }
    }

    /// Hashes an `UnsignedInt` to its own value.
    struct IdentityStrategy;
    impl HashStrategy for IdentityStrategy {
        fn hash_bytes(&self, bytes: &[u8]) -> u32 {
            u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
    }

    fn u(v: u32) -> UnsignedInt {
        UnsignedInt(v)
    }

    fn lcg_table(hint: usize) -> HashTable<'static, UnsignedInt, UnsignedInt, Lcg> {
        HashTable::init(Lcg, TableOptions::default().with_bucket_hint(hint)).unwrap()
    }

    /// Invariant: bucket hints round down to a power of two, floored at 16.
    #[test]
    fn init_rounds_bucket_hint() {
        assert_eq!(lcg_table(0).bucket_count(), 16);
        assert_eq!(lcg_table(100).bucket_count(), 64);
        let t = lcg_table(1024);
        assert_eq!(t.bucket_count(), 1024);
        assert_eq!(t.mask(), 1023);
        assert!(t.is_empty());
        assert_eq!(t.key_type(), ObjectType::UnsignedInt);
    }

    /// Invariant: a rejected ratio yields an error and no table.
    #[test]
    fn init_rejects_bad_ratio() {
        let r: Result<HashTable<'static, UnsignedInt, UnsignedInt, Lcg>> =
            HashTable::init(Lcg, TableOptions::default().with_max_occupancy_ratio(0.0));
        assert!(matches!(
            r,
            Err(HashTableError::InvalidOccupancyRatio { .. })
        ));
    }

    /// Invariant: after a successful insert the pair is found by lookup/exists.
    #[test]
    fn insert_lookup_round_trip() {
        let mut t = lcg_table(16);
        let h = t.insert_owned(u(5), u(50)).unwrap();
        assert_eq!(t.lookup(Some(&u(5)), Some(&u(50))), Some(h));
        assert_eq!(t.lookup(Some(&u(5)), None), Some(h));
        assert!(t.exists(Some(&u(5)), Some(&u(50))));
        assert!(!t.exists(Some(&u(5)), Some(&u(51))));
        assert!(!t.exists(Some(&u(6)), None));
        assert_eq!(h.key(&t), Some(&u(5)));
        assert_eq!(h.yield_value(&t), Some(&u(50)));
    }

    /// Invariant: a duplicate {key, yield} is rejected and the table is unchanged.
    #[test]
    fn duplicate_insert_rejected() {
        let mut t = lcg_table(16);
        t.insert_owned(u(1), u(1)).unwrap();
        match t.insert_owned(u(1), u(1)) {
            Err(HashTableError::DuplicateEntry) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(t.len(), 1);
    }

    /// Invariant: one key may carry several distinct yields.
    #[test]
    fn multimap_same_key() {
        let mut t = lcg_table(16);
        t.insert_owned(u(9), u(1)).unwrap();
        t.insert_owned(u(9), u(2)).unwrap();
        assert_eq!(t.get_entries(Some(&u(9))), 2);
        assert_eq!(t.get_entries(None), 2);
        assert_eq!(t.get_entries(Some(&u(10))), 0);
    }

    /// Invariant: insertion prepends, so chains are most-recent-first.
    #[test]
    fn chain_order_is_lifo() {
        let mut t: HashTable<'static, UnsignedInt, UnsignedInt, ConstStrategy> =
            HashTable::new(ConstStrategy).unwrap();
        for v in 1..=3 {
            t.insert_owned(u(v), u(0)).unwrap();
        }
        assert_eq!(t.chain_len(0), 3);
        let first = t.lookup(None, None).unwrap();
        assert_eq!(first.key(&t), Some(&u(3)));
        let order: Vec<u32> = t.iter().map(|(_, k, _)| k.0).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    /// Invariant: a keyed walk ends at the first non-matching chain successor.
    #[test]
    fn keyed_walk_stops_at_foreign_successor() {
        let mut t: HashTable<'static, UnsignedInt, UnsignedInt, ConstStrategy> =
            HashTable::new(ConstStrategy).unwrap();
        t.insert_owned(u(1), u(10)).unwrap();
        t.insert_owned(u(2), u(20)).unwrap();
        t.insert_owned(u(1), u(30)).unwrap();
        // chain: (1,30) -> (2,20) -> (1,10)
        let first = t.get_next(None, Some(&u(1))).unwrap();
        assert_eq!(first.yield_value(&t), Some(&u(30)));
        assert_eq!(t.get_next(Some(first), Some(&u(1))), None);
        assert_eq!(t.get_entries(Some(&u(1))), 1);
        // the start of a keyed walk skips foreign heads
        let two = t.get_next(None, Some(&u(2))).unwrap();
        assert_eq!(two.yield_value(&t), Some(&u(20)));
        assert_eq!(t.remove(Some(&u(1)), None), 2);
    }

    /// Invariant: a wildcard walk crosses buckets up to and including the last one.
    #[test]
    fn wildcard_walk_reaches_last_bucket() {
        let mut t: HashTable<'static, UnsignedInt, UnsignedInt, IdentityStrategy> =
            HashTable::new(IdentityStrategy).unwrap();
        t.insert_owned(u(0), u(0)).unwrap();
        t.insert_owned(u(15), u(0)).unwrap();
        let a = t.get_next(None, None).unwrap();
        assert_eq!(a.bucket(&t), Some(0));
        let b = t.get_next(Some(a), None).unwrap();
        assert_eq!(b.bucket(&t), Some(15));
        assert_eq!(t.get_next(Some(b), None), None);
        // keyed walk in the last bucket
        let last = t.get_next(None, Some(&u(15))).unwrap();
        assert_eq!(last, b);
        assert_eq!(t.get_next(Some(last), Some(&u(15))), None);
        assert_eq!(t.get_entries(None), 2);
    }

    /// Invariant: an insert that finds entries at the occupancy ratio
    /// doubles the bucket array first.
    #[test]
    fn growth_doubles_buckets() {
        let mut t = lcg_table(16);
        for v in 0..8 {
            t.insert_owned(u(v), u(v)).unwrap();
        }
        // 8 entries in 16 buckets: at the ratio, not yet grown
        assert_eq!(t.bucket_count(), 16);
        t.insert_owned(u(8), u(8)).unwrap();
        assert_eq!(t.bucket_count(), 32);
        for v in 9..100 {
            t.insert_owned(u(v), u(v)).unwrap();
            assert!((t.len() as f64) <= 0.5 * t.bucket_count() as f64);
        }
        for v in 0..100 {
            assert!(t.exists(Some(&u(v)), Some(&u(v))));
        }
    }

    /// Invariant: a small ratio may need several doublings in one insert,
    /// but an empty table is never grown.
    #[test]
    fn growth_can_double_repeatedly() {
        let mut t: HashTable<'static, UnsignedInt, UnsignedInt, Lcg> = HashTable::init(
            Lcg,
            TableOptions::default().with_max_occupancy_ratio(0.01),
        )
        .unwrap();
        t.insert_owned(u(1), u(1)).unwrap();
        assert_eq!(t.bucket_count(), 16);
        t.insert_owned(u(2), u(2)).unwrap();
        // 1 entry needs more than 1 / 0.01 = 100 buckets -> 128
        assert_eq!(t.bucket_count(), 128);
    }

    /// Invariant: a bucket array that cannot be reserved is reported, not aborted on.
    #[test]
    fn unreservable_bucket_array_reports_allocation_failure() {
        match alloc_buckets(usize::MAX) {
            Err(HashTableError::AllocationFailure { requested }) => {
                assert_eq!(requested, usize::MAX)
            }
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
        assert_eq!(alloc_buckets(16).unwrap(), vec![None; 16]);
    }

    /// Invariant: rebuild keeps every item, payload and handle.
    #[test]
    fn rebuild_preserves_items_and_handles() {
        let mut t = lcg_table(1024);
        let handles: Vec<_> = (0..40)
            .map(|v| t.insert_owned(u(v % 10), u(v)).unwrap())
            .collect();
        t.rebuild(64).unwrap();
        assert_eq!(t.bucket_count(), 64);
        assert_eq!(t.len(), 40);
        for (v, h) in handles.iter().enumerate() {
            assert_eq!(h.key(&t), Some(&u(v as u32 % 10)));
            assert_eq!(h.yield_value(&t), Some(&u(v as u32)));
            assert!(h.bucket(&t).unwrap() < 64);
        }
        assert_eq!(t.iter().count(), 40);
        for k in 0..10 {
            let with_key = t.iter().filter(|(_, key, _)| key.0 == k).count();
            assert_eq!(with_key, 4);
            assert!(t.exists(Some(&u(k)), Some(&u(k + 30))));
        }
    }

    /// Invariant: remove(k, None) deletes all yields of k and nothing else.
    #[test]
    fn remove_all_yields_of_key() {
        let mut t = lcg_table(16);
        for y in 0..3 {
            t.insert_owned(u(7), u(y)).unwrap();
        }
        t.insert_owned(u(8), u(0)).unwrap();
        assert_eq!(t.remove(Some(&u(7)), None), 3);
        assert!(!t.exists(Some(&u(7)), None));
        assert!(t.exists(Some(&u(8)), Some(&u(0))));
        assert_eq!(t.remove(Some(&u(7)), None), 0);
        assert_eq!(t.remove(None, Some(&u(0))), 1);
        assert!(t.is_empty());
    }

    /// Invariant: removing by handle unlinks in O(1) and invalidates the handle.
    #[test]
    fn remove_item_by_handle() {
        let mut t: HashTable<'static, UnsignedInt, UnsignedInt, ConstStrategy> =
            HashTable::new(ConstStrategy).unwrap();
        let a = t.insert_owned(u(1), u(1)).unwrap();
        let b = t.insert_owned(u(2), u(2)).unwrap();
        let c = t.insert_owned(u(3), u(3)).unwrap();
        // middle of the chain: c -> b -> a
        let (k, y) = t.remove_item(b).unwrap();
        assert_eq!((k.0, y.0), (2, 2));
        assert!(t.remove_item(b).is_none());
        assert_eq!(b.key(&t), None);
        assert_eq!(t.get_next(Some(c), None), Some(a));
        // head
        t.remove_item(c).unwrap();
        assert_eq!(t.lookup(None, None), Some(a));
        assert_eq!(t.len(), 1);
    }

    /// Invariant: stale handles never alias new items.
    #[test]
    fn stale_handle_does_not_alias_new_item() {
        let mut t = lcg_table(16);
        let h1 = t.insert_owned(u(1), u(1)).unwrap();
        assert_eq!(t.remove(Some(&u(1)), None), 1);
        let h2 = t.insert_owned(u(2), u(2)).unwrap();
        assert_ne!(h1, h2);
        assert!(h1.yield_value(&t).is_none());
        assert_eq!(t.get_next(Some(h1), None), None);
    }

    /// Invariant: reset empties the table without shrinking it.
    #[test]
    fn reset_keeps_bucket_count() {
        let mut t = lcg_table(16);
        for v in 0..20 {
            t.insert_owned(u(v), u(v)).unwrap();
        }
        let grown = t.bucket_count();
        assert!(grown > 16);
        t.reset();
        assert_eq!(t.len(), 0);
        assert_eq!(t.bucket_count(), grown);
        assert_eq!(t.lookup(None, None), None);
        assert!((0..grown).all(|b| t.chain_len(b) == 0));
        t.destroy();
    }

    /// Invariant: reference mode stores borrows, copy mode stores copies.
    #[test]
    fn copy_flags_choose_ownership() {
        let k = u(4);
        let y = u(40);
        let mut refs: HashTable<'_, UnsignedInt, UnsignedInt, Lcg> = HashTable::init(
            Lcg,
            TableOptions::default()
                .with_copy_keys(false)
                .with_copy_yields(false),
        )
        .unwrap();
        let h = refs.insert(&k, &y).unwrap();
        let (rk, ry) = refs.remove_item(h).unwrap();
        assert!(matches!(rk, Cow::Borrowed(_)));
        assert!(matches!(ry, Cow::Borrowed(_)));

        let mut copies: HashTable<'_, UnsignedInt, UnsignedInt, Lcg> =
            HashTable::new(Lcg).unwrap();
        let h = copies.insert(&k, &y).unwrap();
        let (ck, cy) = copies.remove_item(h).unwrap();
        assert!(matches!(ck, Cow::Owned(_)));
        assert!(matches!(cy, Cow::Owned(_)));
    }

    /// Invariant: yields can be updated in place without touching the key.
    #[test]
    fn yield_mut_merges_counters() {
        let mut t: HashTable<'static, Connection, ConnectionInfo, Lcg> =
            HashTable::new(Lcg).unwrap();
        let c = Connection::new(0x0a00_0001, 5000, 0x0a00_0002, 80, 6);
        let h = t
            .insert_owned(c, ConnectionInfo::packet(100.0, true))
            .unwrap();
        let found = t.lookup(Some(&c.reversed()), None).unwrap();
        assert_eq!(found, h);
        found
            .yield_mut(&mut t)
            .unwrap()
            .add(&ConnectionInfo::packet(60.0, false));
        let info = h.yield_value(&t).unwrap();
        assert_eq!(info.pkts, 2);
        assert_eq!(info.bytes, 160.0);
        assert_eq!(info.bytes_bwd, 60.0);
    }

    /// Invariant: yield_mut writes through without a uniqueness check, so a
    /// rewritten yield may duplicate a sibling and both copies stay linked.
    #[test]
    fn yield_mut_does_not_recheck_uniqueness() {
        let mut t = lcg_table(16);
        t.insert_owned(u(3), u(1)).unwrap();
        let h = t.insert_owned(u(3), u(2)).unwrap();
        *h.yield_mut(&mut t).unwrap() = u(1);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get_entries(Some(&u(3))), 2);
        assert!(matches!(
            t.insert_owned(u(3), u(1)),
            Err(HashTableError::DuplicateEntry)
        ));
        assert_eq!(t.remove(Some(&u(3)), Some(&u(1))), 2);
        assert!(t.is_empty());
    }
}
