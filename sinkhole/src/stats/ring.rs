/// Fixed-capacity buffer that overwrites its oldest entry once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    /// Slot the next push writes to.
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.head] = item;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Entries from most recent to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> {
        let len = self.len();
        // While filling, head == len, so this also holds before the first wrap.
        (0..len).map(move |i| &self.slots[(self.head + len - 1 - i) % len])
    }
}
