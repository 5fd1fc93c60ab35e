//! Lock-free single-producer/single-consumer ring buffer.
//!
//! The three pipeline stages are connected by these queues: feed → strategy
//! carries book events, strategy → execution carries orders, and the signer
//! feeds precomputed ephemerals to the gateway through a third instance.
//!
//! # Design
//!
//! - Capacity is a power of two so indices wrap with a mask instead of a
//!   modulo. One slot is kept empty to distinguish full from empty, so a
//!   ring of capacity `N` holds at most `N - 1` items.
//! - `head` (written by the producer) and `tail` (written by the consumer)
//!   live on separate cache lines, and every slot is padded to a cache line,
//!   so the two threads never contend on the same line.
//! - The producer writes the slot, then publishes `head` with a `Release`
//!   store; the consumer `Acquire`-loads `head` before reading the slot.
//!   The symmetric `tail` edge signals slot reuse back to the producer.
//!
//! `len()` is a racy snapshot and is only suitable for metrics.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single slot, padded to its own cache line.
#[repr(align(64))]
struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Producer-side counter on its own cache line.
#[repr(align(64))]
struct Counter {
    value: AtomicUsize,
}

struct RingInner<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    head: Counter,
    tail: Counter,
}

// SAFETY: slots are only touched by the single producer (between tail and
// head) or the single consumer (between head and tail); the head/tail
// release/acquire pairs order those accesses.
unsafe impl<T: Send> Send for RingInner<T> {}
unsafe impl<T: Send> Sync for RingInner<T> {}

impl<T> Drop for RingInner<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }
        // Both handles are gone, so no concurrent access remains.
        let mut tail = self.tail.value.load(Ordering::Relaxed);
        let head = self.head.value.load(Ordering::Relaxed);
        while tail != head {
            unsafe { (*self.slots[tail].value.get()).assume_init_drop() };
            tail = (tail + 1) & self.mask;
        }
    }
}

/// Producer half of an SPSC ring. Not clonable — exactly one producer thread.
pub struct Producer<T> {
    inner: Arc<RingInner<T>>,
}

/// Consumer half of an SPSC ring. Not clonable — exactly one consumer thread.
pub struct Consumer<T> {
    inner: Arc<RingInner<T>>,
}

unsafe impl<T: Send> Send for Producer<T> {}
unsafe impl<T: Send> Send for Consumer<T> {}

/// Create a new SPSC ring with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two or is smaller than 2.
pub fn spsc_ring<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(
        capacity.is_power_of_two() && capacity >= 2,
        "ring capacity must be a power of two >= 2"
    );

    let slots = (0..capacity)
        .map(|_| Slot {
            value: UnsafeCell::new(MaybeUninit::uninit()),
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let inner = Arc::new(RingInner {
        slots,
        mask: capacity - 1,
        head: Counter {
            value: AtomicUsize::new(0),
        },
        tail: Counter {
            value: AtomicUsize::new(0),
        },
    });

    (
        Producer {
            inner: Arc::clone(&inner),
        },
        Consumer { inner },
    )
}

impl<T> Producer<T> {
    /// Push an item. Returns the item back if the ring is full.
    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let inner = &*self.inner;
        let head = inner.head.value.load(Ordering::Relaxed);
        let next = (head + 1) & inner.mask;

        if next == inner.tail.value.load(Ordering::Acquire) {
            return Err(item);
        }

        unsafe { (*inner.slots[head].value.get()).write(item) };
        inner.head.value.store(next, Ordering::Release);
        Ok(())
    }

    /// Racy occupancy snapshot (metrics only).
    #[inline]
    pub fn len(&self) -> usize {
        ring_len(&self.inner)
    }

    /// Returns `true` if the racy snapshot sees no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items the ring can hold (capacity − 1).
    #[inline]
    pub fn max_len(&self) -> usize {
        self.inner.mask
    }
}

impl<T> Consumer<T> {
    /// Pop the oldest item, or `None` if the ring is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let tail = inner.tail.value.load(Ordering::Relaxed);

        if tail == inner.head.value.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { (*inner.slots[tail].value.get()).assume_init_read() };
        inner.tail.value.store((tail + 1) & inner.mask, Ordering::Release);
        Some(item)
    }

    /// Racy occupancy snapshot (metrics only).
    #[inline]
    pub fn len(&self) -> usize {
        ring_len(&self.inner)
    }

    /// Returns `true` if the racy snapshot sees no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline]
fn ring_len<T>(inner: &RingInner<T>) -> usize {
    let head = inner.head.value.load(Ordering::Relaxed);
    let tail = inner.tail.value.load(Ordering::Relaxed);
    head.wrapping_sub(tail) & inner.mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_single_thread() {
        let (mut tx, mut rx) = spsc_ring::<u64>(8);
        assert!(rx.pop().is_none());

        for i in 0..5 {
            tx.push(i).unwrap();
        }
        assert_eq!(tx.len(), 5);

        for i in 0..5 {
            assert_eq!(rx.pop(), Some(i));
        }
        assert!(rx.pop().is_none());
    }

    #[test]
    fn full_ring_rejects() {
        let (mut tx, mut rx) = spsc_ring::<u32>(4);
        // Capacity 4 holds 3 items.
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();
        assert_eq!(tx.push(4), Err(4));

        assert_eq!(rx.pop(), Some(1));
        tx.push(4).unwrap();
        assert_eq!(tx.push(5), Err(5));
    }

    #[test]
    fn wraparound_preserves_order() {
        let (mut tx, mut rx) = spsc_ring::<u64>(8);
        // Cycle enough times to wrap the indices repeatedly.
        let mut expected = 0u64;
        for i in 0..100u64 {
            tx.push(i).unwrap();
            if i % 3 == 2 {
                for _ in 0..3 {
                    assert_eq!(rx.pop(), Some(expected));
                    expected += 1;
                }
            }
        }
        while let Some(v) = rx.pop() {
            assert_eq!(v, expected);
            expected += 1;
        }
        assert_eq!(expected, 100);
    }

    #[test]
    fn fifo_across_threads() {
        const N: u64 = 100_000;
        let (mut tx, mut rx) = spsc_ring::<u64>(1024);

        let producer = std::thread::spawn(move || {
            for i in 0..N {
                let mut item = i;
                loop {
                    match tx.push(item) {
                        Ok(()) => break,
                        Err(back) => {
                            item = back;
                            std::hint::spin_loop();
                        }
                    }
                }
            }
        });

        let mut next = 0u64;
        while next < N {
            match rx.pop() {
                Some(v) => {
                    // Exact push order, no duplicates, no losses.
                    assert_eq!(v, next);
                    next += 1;
                }
                None => std::hint::spin_loop(),
            }
        }

        producer.join().unwrap();
        assert!(rx.pop().is_none());
    }

    #[test]
    fn drops_unconsumed_items() {
        use std::sync::atomic::AtomicUsize;

        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (mut tx, rx) = spsc_ring::<Tracked>(8);
        for _ in 0..4 {
            let _ = tx.push(Tracked);
        }
        drop(tx);
        drop(rx);
        assert_eq!(DROPS.load(Ordering::Relaxed), 4);
    }

    #[test]
    #[should_panic]
    fn non_power_of_two_rejected() {
        let _ = spsc_ring::<u8>(6);
    }
}
