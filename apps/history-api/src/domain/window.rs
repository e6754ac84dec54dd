//! Trailing Window Buffer
//!
//! Keeps the most recent `limit` items of a sequence whose length is unknown
//! up front. Once full, every push evicts the oldest item first, so the
//! buffer never holds more than `limit` items.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Upper bound on capacity reserved before any item arrives.
///
/// Caller-supplied limits can be arbitrarily large; the buffer grows on
/// demand past this point.
const MAX_PREALLOCATION: usize = 4096;

/// Fixed-capacity ring buffer keeping the last `limit` items pushed.
#[derive(Debug, Clone)]
pub struct TrailingWindow<T> {
    items: VecDeque<T>,
    limit: Option<NonZeroUsize>,
    seen: usize,
    peak: usize,
}

impl<T> TrailingWindow<T> {
    /// Create a window; `None` keeps every item.
    #[must_use]
    pub fn new(limit: Option<NonZeroUsize>) -> Self {
        let reserve = limit.map_or(0, |l| l.get().min(MAX_PREALLOCATION));
        Self {
            items: VecDeque::with_capacity(reserve),
            limit,
            seen: 0,
            peak: 0,
        }
    }

    /// Push an item, evicting the oldest one when the window is full.
    pub fn push(&mut self, item: T) {
        if let Some(limit) = self.limit
            && self.items.len() == limit.get()
        {
            self.items.pop_front();
        }
        self.items.push_back(item);
        self.seen += 1;
        self.peak = self.peak.max(self.items.len());
    }

    /// Items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total items pushed, including evicted ones.
    #[must_use]
    pub const fn seen(&self) -> usize {
        self.seen
    }

    /// Largest number of items held at once.
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    /// Consume the window, oldest item first.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.items.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(n: usize) -> Option<NonZeroUsize> {
        NonZeroUsize::new(n)
    }

    #[test]
    fn keeps_last_items_in_order() {
        let mut window = TrailingWindow::new(limit(3));
        for i in 0..10 {
            window.push(i);
        }
        assert_eq!(window.into_vec(), vec![7, 8, 9]);
    }

    #[test]
    fn short_sequence_is_kept_whole() {
        let mut window = TrailingWindow::new(limit(5));
        for i in 0..3 {
            window.push(i);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.into_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn unbounded_keeps_everything() {
        let mut window = TrailingWindow::new(None);
        for i in 0..1000 {
            window.push(i);
        }
        assert_eq!(window.seen(), 1000);
        assert_eq!(window.peak(), 1000);
        assert_eq!(window.into_vec().len(), 1000);
    }

    #[test]
    fn peak_never_exceeds_limit() {
        let mut window = TrailingWindow::new(limit(4));
        for i in 0..100 {
            window.push(i);
            assert!(window.len() <= 4);
        }
        assert_eq!(window.seen(), 100);
        assert_eq!(window.peak(), 4);
    }

    #[test]
    fn huge_limit_does_not_preallocate() {
        let window: TrailingWindow<u64> = TrailingWindow::new(limit(usize::MAX));
        assert!(window.is_empty());
        assert!(window.items.capacity() < usize::MAX / 2);
    }
}
