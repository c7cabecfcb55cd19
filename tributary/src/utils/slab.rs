/// A simple slab allocator.
///
/// A `Slab` stores values in a vector of slots and hands out small, stable
/// keys that are reused after removal. It is used to register children
/// (inner subscriptions, connected subscribers) that come and go while the
/// parent lives.
pub(crate) struct Slab<T> {
    /// Storage; `None` marks a free slot.
    items: Vec<Option<T>>,
    /// Stack of free keys that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates an empty `Slab` with room for `capacity` entries.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value and returns its key.
    ///
    /// A free slot is reused if available, otherwise the slab grows.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        self.len += 1;

        if let Some(key) = self.free.pop() {
            self.items[key] = Some(item);
            return key;
        }

        self.items.push(Some(item));
        self.items.len() - 1
    }

    /// Removes and returns the value stored at `key`, if any.
    pub(crate) fn remove(&mut self, key: usize) -> Option<T> {
        let item = self.items.get_mut(key)?.take()?;

        self.free.push(key);
        self.len -= 1;

        Some(item)
    }

    /// Returns a mutable reference to the value at `key`, if any.
    pub(crate) fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        self.items.get_mut(key)?.as_mut()
    }

    /// Iterates over the occupied slots.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(Option::as_ref)
    }

    /// Removes every value, returning them in key order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.free.clear();
        self.len = 0;

        self.items.drain(..).flatten().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
