//! Packet identifier allocation.

use std::sync::atomic::{AtomicU16, Ordering};

/// Hands out packet identifiers for outbound QoS 1 and QoS 2 publishes, subscribes, and
/// unsubscribes.
///
/// Identifiers are assigned in increasing order starting from 1, wrapping back to 1 after
/// `u16::MAX` (0 is reserved by the protocol and is never issued).
pub struct IdAllocator {
    next: AtomicU16,
}

impl IdAllocator {
    /// Create a new allocator. The first id issued will be 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(1),
        }
    }

    /// Allocate the next packet identifier.
    pub fn next_id(&self) -> u16 {
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let next = if current == u16::MAX { 1 } else { current + 1 };
            if self
                .next
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current;
            }
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::IdAllocator;

    #[test]
    fn issues_increasing_ids_starting_at_one() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.next_id(), 1);
        assert_eq!(alloc.next_id(), 2);
        assert_eq!(alloc.next_id(), 3);
    }

    #[test]
    fn wraps_around_skipping_zero() {
        let alloc = IdAllocator {
            next: std::sync::atomic::AtomicU16::new(u16::MAX),
        };
        assert_eq!(alloc.next_id(), u16::MAX);
        assert_eq!(alloc.next_id(), 1);
    }

    #[test]
    fn concurrent_callers_never_observe_duplicates() {
        use std::sync::Arc;
        use std::thread;

        let alloc = Arc::new(IdAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let alloc = alloc.clone();
            handles.push(thread::spawn(move || {
                (0..256).map(|_| alloc.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut all_ids: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all_ids.len();
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), total);
    }
}
