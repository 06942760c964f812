/// Handle to a value stored in a [`Slab`].
///
/// A key remembers the generation of the slot it was issued for, so a key
/// kept after [`Slab::remove`] never resolves to a later occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A generational slab allocator.
///
/// Values live in a contiguous array of slots. Freed slots are reused,
/// and every reuse bumps the slot generation so that stale [`Key`]s are
/// rejected instead of silently pointing at the new value.
pub(crate) struct Slab<T> {
    /// Storage for items; `None` marks a free slot.
    slots: Vec<Slot<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` free slots.
    pub(crate) fn new(size: usize) -> Self {
        let mut slab = Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        };
        slab.grow_to(size);
        slab
    }

    fn grow_to(&mut self, new_len: usize) {
        let len = self.slots.len();

        self.slots.extend((len..new_len).map(|_| Slot {
            generation: 0,
            value: None,
        }));
        // Lowest indices are handed out first.
        self.free.extend((len..new_len).rev().map(|i| i as u32));
    }

    /// Inserts a value and returns its key.
    ///
    /// If a free slot is available it is reused, otherwise the slab
    /// doubles in size.
    pub(crate) fn insert(&mut self, item: T) -> Key {
        if self.free.is_empty() {
            let len = self.slots.len();
            self.grow_to(if len == 0 { 1 } else { 2 * len });
        }

        let index = self.free.pop().unwrap_or_default();
        let slot = &mut self.slots[index as usize];
        slot.value = Some(item);
        self.len += 1;

        Key {
            index,
            generation: slot.generation,
        }
    }

    /// Removes and returns the value for `key`.
    ///
    /// Returns `None` if the key is stale or was already removed.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index())?;
        if slot.generation != key.generation {
            return None;
        }

        let item = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;

        Some(item)
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
