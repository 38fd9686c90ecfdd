use crate::error::{SimError, SimResult};

/// Fixed-capacity ring buffer for time-series state (price candles, profiler
/// samples, per-building cycle results).
///
/// `push` is O(1) and overwrites the oldest element once full. Logical index 0
/// is always the oldest retained element; iteration runs oldest to newest.
/// Capacity is immutable after construction.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    /// Physical index of the oldest element once the buffer has wrapped.
    head: usize,
    cap: usize,
}

impl<T> RingBuffer<T> {
    pub fn with_capacity(cap: usize) -> SimResult<Self> {
        if cap == 0 {
            return Err(SimError::InvalidCapacity(cap));
        }
        Ok(Self {
            buf: Vec::with_capacity(cap),
            head: 0,
            cap,
        })
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() < self.cap {
            self.buf.push(item);
        } else {
            self.buf[self.head] = item;
            self.head = (self.head + 1) % self.cap;
        }
    }

    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.cap.max(1)
    }

    /// Element by logical index: 0 = oldest, len-1 = newest.
    pub fn get(&self, logical: usize) -> Option<&T> {
        if logical >= self.buf.len() {
            return None;
        }
        Some(&self.buf[self.physical(logical)])
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&T> {
        if self.buf.is_empty() {
            None
        } else {
            self.get(self.buf.len() - 1)
        }
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.buf.len()).map(|i| &self.buf[self.physical(i)])
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out oldest-to-newest.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// The newest `n` elements, oldest-to-newest.
    pub fn last_n(&self, n: usize) -> Vec<T> {
        let skip = self.buf.len().saturating_sub(n);
        self.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            RingBuffer::<u32>::with_capacity(0).unwrap_err(),
            SimError::InvalidCapacity(0)
        );
    }

    #[test]
    fn push_and_read_before_wrap() {
        let mut ring = RingBuffer::with_capacity(4).unwrap();
        ring.push(1);
        ring.push(2);
        ring.push(3);

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.first(), Some(&1));
        assert_eq!(ring.last(), Some(&3));
        assert_eq!(ring.get(1), Some(&2));
        assert_eq!(ring.get(3), None);
        assert_eq!(ring.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn wrap_overwrites_oldest() {
        let mut ring = RingBuffer::with_capacity(3).unwrap();
        for i in 1..=5 {
            ring.push(i);
        }

        // 1 and 2 were overwritten by 4 and 5
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![3, 4, 5]);
        assert_eq!(ring.first(), Some(&3));
        assert_eq!(ring.last(), Some(&5));
    }

    #[test]
    fn last_n_clamps_to_len() {
        let mut ring = RingBuffer::with_capacity(5).unwrap();
        for i in 0..4 {
            ring.push(i);
        }
        assert_eq!(ring.last_n(2), vec![2, 3]);
        assert_eq!(ring.last_n(10), vec![0, 1, 2, 3]);
    }

    #[test]
    fn iteration_is_oldest_to_newest_after_many_wraps() {
        let mut ring = RingBuffer::with_capacity(3).unwrap();
        for i in 0..100 {
            ring.push(i);
        }
        let collected: Vec<_> = ring.iter().copied().collect();
        assert_eq!(collected, vec![97, 98, 99]);
    }

    #[test]
    fn clear_resets() {
        let mut ring = RingBuffer::with_capacity(2).unwrap();
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();
        assert!(ring.is_empty());
        ring.push(7);
        assert_eq!(ring.to_vec(), vec![7]);
    }
}
