pub trait PersistentMap<K: Eq + Clone, V>: Sized {
    fn new() -> Self;

    /// Insert (key, value) into the map.
    ///
    /// Return the updated map. The old map stays as it was.
    /// If the key already exists, only its value is replaced; the key keeps
    /// its original position in the insertion order.
    fn insert(&self, key: &K, value: V) -> Self;

    /// Lookup (key, value) from the map with the key.
    ///
    /// If success, return the reference of the value.
    /// If fail, return None.
    fn lookup(&self, key: &K) -> Option<&V>;

    /// Remove (key, value) from the map with the key.
    ///
    /// Return the map without the entry. If the key does not exist, the
    /// returned map equals the old one.
    fn remove(&self, key: &K) -> Self;

    /// Get the number of entries without scanning.
    fn len(&self) -> usize;
}
