//! Fixed-capacity circular buffer with overwrite-on-overflow
//!
//! Pushing into a full buffer evicts the oldest element. An optional overflow
//! callback sees each evicted value before it is dropped. The vocoder only
//! uses this as an overlap-add scratch area, so overflow means the caller
//! pushed more than one frame's worth without draining.

use std::fmt;

/// Callback invoked with every element evicted by an overflowing push
pub type OverflowCallback<T> = Box<dyn FnMut(T) + Send>;

pub struct RingBuffer<T> {
    data: Vec<T>,
    /// Physical index of the logical front
    head: usize,
    len: usize,
    on_overflow: Option<OverflowCallback<T>>,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
            head: 0,
            len: 0,
            on_overflow: None,
        }
    }

    /// Create a ring buffer that reports evicted elements
    pub fn with_overflow(capacity: usize, callback: OverflowCallback<T>) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.on_overflow = Some(callback);
        buffer
    }

    /// Create a full buffer of `capacity` default values
    pub fn filled(capacity: usize) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.len = capacity;
        buffer
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    #[inline]
    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.capacity()
    }

    /// Append at the logical end, evicting the front if full
    pub fn push(&mut self, value: T) {
        let capacity = self.capacity();
        if capacity == 0 {
            if let Some(callback) = self.on_overflow.as_mut() {
                callback(value);
            }
            return;
        }

        if self.len == capacity {
            let evicted = self.data[self.head];
            self.data[self.head] = value;
            self.head = (self.head + 1) % capacity;
            if let Some(callback) = self.on_overflow.as_mut() {
                callback(evicted);
            }
        } else {
            let tail = self.physical(self.len);
            self.data[tail] = value;
            self.len += 1;
        }
    }

    /// Remove and return the oldest element
    pub fn shift(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.data[self.head];
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(value)
    }

    /// Remove and return the newest element
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.data[self.physical(self.len)])
    }

    /// Element at logical position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        Some(&self.data[self.physical(index)])
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let physical = self.physical(index);
        Some(&mut self.data[physical])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Make the buffer full, every slot holding `value`
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
        self.head = 0;
        self.len = self.capacity();
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).map(move |i| &self.data[self.physical(i)])
    }
}

impl<T: Copy + Default> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.data.len())
            .field("len", &self.len)
            .field("head", &self.head)
            .finish()
    }
}
