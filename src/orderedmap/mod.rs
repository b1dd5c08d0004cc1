mod reduce;

pub use reduce::{IntoIter, Reduced, Step};

use crate::map::PersistentMap;
use crate::some_or;
use std::{
    collections::HashMap,
    fmt,
    fmt::Debug,
    hash::Hash,
    iter::FromIterator,
    ops::Index,
    sync::Arc,
};

type Link<K> = Option<Arc<Node<K>>>;

struct Node<K> {
    key: K,
    next: Link<K>,
}

/// A persistent map that remembers the order in which its keys were first
/// inserted.
///
/// The keys live in a shared singly linked chain, newest first, so adding a
/// new key is a single prepend and every older version keeps the whole tail.
/// The values live in a copy-on-write hash table. Every mutating operation
/// returns a new map; the receiver is never touched.
pub struct OrderedMap<K, V> {
    keys: Link<K>, // reverse insertion order: the newest key is at the head
    lookup: Arc<HashMap<K, V>>,
    size: usize,
}

/// Error of [`OrderedMap::try_insert`] on an already existing key.
///
/// Carries the offending key and the map as it was at the call, so the
/// message can show both.
pub struct KeyConflict<K, V> {
    key: K,
    map: OrderedMap<K, V>,
}

/// Decision returned by the closure of [`OrderedMap::get_and_update`].
pub enum Update<V> {
    /// Store `put` under the key; `get` is handed back to the caller.
    Put { get: Option<V>, put: V },
    /// Drop the entry; its former value is handed back to the caller.
    Pop,
}

// rebuild the chain in front of `key`, sharing everything behind it
fn unlink<K: Eq + Clone>(head: &Link<K>, key: &K) -> Link<K> {
    let mut prefix = Vec::new();
    let mut cur = head;

    while let Some(node) = cur {
        if node.key == *key {
            let mut rebuilt = node.next.clone();

            while let Some(k) = prefix.pop() {
                rebuilt = Some(Arc::new(Node {
                    key: k,
                    next: rebuilt,
                }));
            }

            return rebuilt;
        }

        prefix.push(node.key.clone());
        cur = &node.next;
    }

    head.clone()
}

impl<K, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        OrderedMap {
            keys: None,
            lookup: Arc::new(HashMap::new()),
            size: 0,
        }
    }

    /// Get the number of entries. The count is cached, never recomputed by
    /// scanning.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Get all keys in insertion order (oldest first), as a fresh sequence.
    pub fn keys(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.size);
        let mut cur = &self.keys;

        while let Some(node) = cur {
            keys.push(&node.key);
            cur = &node.next;
        }

        keys.reverse();
        keys
    }
}

impl<K: Eq + Hash, V> OrderedMap<K, V> {
    /// Lookup the value of the key.
    ///
    /// If success, return the reference of the value.
    /// If fail, return None.
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.lookup.get(key)
    }

    /// Lookup the value of the key, or fall back to `default` if the key is
    /// absent. A stored value always wins over the fallback, whatever it is.
    pub fn lookup_or<'a>(&'a self, key: &K, default: &'a V) -> &'a V {
        self.lookup.get(key).unwrap_or(default)
    }

    /// Check if the key is present. Presence is decided by the table alone,
    /// never by inspecting the value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lookup.contains_key(key)
    }

    /// Get all values in insertion order of their keys, position for
    /// position with [`keys`](OrderedMap::keys).
    pub fn values(&self) -> Vec<&V> {
        self.keys().into_iter().map(|key| &self.lookup[key]).collect()
    }

    /// Iterate over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let table = &self.lookup;
        self.keys().into_iter().map(move |key| (key, &table[key]))
    }

    /// Get up to `length` entries starting at insertion-order position
    /// `start`. Bounds past the end are clamped; the result is just shorter.
    pub fn slice(&self, start: usize, length: usize) -> Vec<(&K, &V)> {
        self.iter().skip(start).take(length).collect()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OrderedMap<K, V> {
    /// Insert (key, value) into the map.
    ///
    /// Return the updated map. A new key is prepended to the key chain; an
    /// existing key keeps its position and only the value is replaced.
    pub fn insert(&self, key: &K, value: V) -> Self {
        let mut table = HashMap::clone(&self.lookup);
        let replaced = table.insert(key.clone(), value).is_some();

        if replaced {
            OrderedMap {
                keys: self.keys.clone(),
                lookup: Arc::new(table),
                size: self.size,
            }
        } else {
            OrderedMap {
                keys: Some(Arc::new(Node {
                    key: key.clone(),
                    next: self.keys.clone(),
                })),
                lookup: Arc::new(table),
                size: self.size + 1,
            }
        }
    }

    /// Insert (key, value) only if the key is absent; otherwise return a map
    /// equal to this one.
    pub fn insert_if_absent(&self, key: &K, value: V) -> Self {
        if self.contains_key(key) {
            self.clone()
        } else {
            self.insert(key, value)
        }
    }

    /// Insert (key, value), or fail with [`KeyConflict`] if the key already
    /// exists. This is the only failing operation of the map.
    pub fn try_insert(&self, key: &K, value: V) -> Result<Self, KeyConflict<K, V>> {
        if self.contains_key(key) {
            return Err(KeyConflict {
                key: key.clone(),
                map: self.clone(),
            });
        }

        Ok(self.insert(key, value))
    }

    /// Remove the entry of the key.
    ///
    /// Return the map without the entry. If the key is absent (the empty map
    /// included), the returned map equals this one.
    pub fn remove(&self, key: &K) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }

        let mut table = HashMap::clone(&self.lookup);
        table.remove(key);

        OrderedMap {
            keys: unlink(&self.keys, key),
            lookup: Arc::new(table),
            size: self.size.saturating_sub(1),
        }
    }

    /// Remove the entry of the key and hand its value back.
    ///
    /// If the key is absent, return (None, a map equal to this one).
    pub fn pop(&self, key: &K) -> (Option<V>, Self) {
        let value = some_or!(self.lookup.get(key), return (None, self.clone()));

        (Some(value.clone()), self.remove(key))
    }

    /// Read the current value of the key (None if absent), let `transform`
    /// decide, and apply the decision: [`Update::Put`] stores a new value
    /// through [`insert`](OrderedMap::insert) and hands `get` back,
    /// [`Update::Pop`] removes the entry and hands its former value back.
    pub fn get_and_update<F>(&self, key: &K, transform: F) -> (Option<V>, Self)
    where
        F: FnOnce(Option<&V>) -> Update<V>,
    {
        match transform(self.lookup.get(key)) {
            Update::Put { get, put } => (get, self.insert(key, put)),
            Update::Pop => self.pop(key),
        }
    }

    /// Fold the entries in insertion order under the caller's control.
    ///
    /// At every entry `step` answers with [`Step::Continue`] to go on,
    /// [`Step::Halt`] to stop with the accumulator, or [`Step::Suspend`] to
    /// pause; a suspended traversal carries its iterator so the caller can
    /// resume from the next unvisited entry without rescanning.
    pub fn reduce<A, F>(&self, init: A, step: F) -> Reduced<A, K, V>
    where
        F: FnMut(A, (K, V)) -> Step<A>,
    {
        self.clone().into_iter().resume(init, step)
    }
}

impl<K, V> Clone for OrderedMap<K, V> {
    // two refcount bumps and a usize, whatever the map holds
    fn clone(&self) -> Self {
        OrderedMap {
            keys: self.keys.clone(),
            lookup: Arc::clone(&self.lookup),
            size: self.size,
        }
    }
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Drop for OrderedMap<K, V> {
    fn drop(&mut self) {
        // dismantle exclusively owned nodes iteratively; a long chain must
        // not recurse on drop
        let mut cur = self.keys.take();

        while let Some(node) = cur {
            match Arc::try_unwrap(node) {
                Ok(mut node) => cur = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

impl<K: Eq + Hash + Debug, V: Debug> Debug for OrderedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.size != other.size {
            return false;
        }

        // versions sharing both backing structures are equal without a walk
        let same_head = match (&self.keys, &other.keys) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same_head && Arc::ptr_eq(&self.lookup, &other.lookup) {
            return true;
        }

        let mut ours = &self.keys;
        let mut theirs = &other.keys;

        loop {
            match (ours, theirs) {
                (Some(a), Some(b)) => {
                    if a.key != b.key || self.lookup.get(&a.key) != other.lookup.get(&a.key) {
                        return false;
                    }

                    ours = &a.next;
                    theirs = &b.next;
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl<K: Eq + Hash, V: Eq> Eq for OrderedMap<K, V> {}

impl<'a, K: Eq + Hash, V> Index<&'a K> for OrderedMap<K, V> {
    type Output = V;

    fn index(&self, key: &K) -> &V {
        self.lookup.get(key).expect("no entry found for key")
    }
}

impl<K: Eq + Hash + Clone, V: Clone> FromIterator<(K, V)> for OrderedMap<K, V> {
    /// Collect a sequence of pairs left to right through
    /// [`insert`](OrderedMap::insert): a later duplicate key overwrites the
    /// value but keeps the first occurrence's position.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(pairs: I) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |map, (key, value)| map.insert(&key, value))
    }
}

impl<K: Eq + Hash + Clone, V: Clone> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        // collected newest first so the iterator pops from the back in
        // insertion order
        let mut entries = Vec::with_capacity(self.size);
        let mut cur = &self.keys;

        while let Some(node) = cur {
            entries.push((node.key.clone(), self.lookup[&node.key].clone()));
            cur = &node.next;
        }

        IntoIter::new(entries)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> PersistentMap<K, V> for OrderedMap<K, V> {
    fn new() -> Self {
        OrderedMap::new()
    }

    fn insert(&self, key: &K, value: V) -> Self {
        OrderedMap::insert(self, key, value)
    }

    fn lookup(&self, key: &K) -> Option<&V> {
        OrderedMap::lookup(self, key)
    }

    fn remove(&self, key: &K) -> Self {
        OrderedMap::remove(self, key)
    }

    fn len(&self) -> usize {
        OrderedMap::len(self)
    }
}

impl<K, V> KeyConflict<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The map as it was when the conflicting insert was attempted.
    pub fn map(&self) -> &OrderedMap<K, V> {
        &self.map
    }
}

impl<K: Eq + Hash + Debug, V: Debug> Debug for KeyConflict<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConflict")
            .field("key", &self.key)
            .field("map", &self.map)
            .finish()
    }
}

impl<K: Eq + Hash + Debug, V: Debug> fmt::Display for KeyConflict<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the key {:?} already exists in {:?}",
            self.key, self.map
        )
    }
}

impl<K: Eq + Hash + Debug, V: Debug> std::error::Error for KeyConflict<K, V> {}
