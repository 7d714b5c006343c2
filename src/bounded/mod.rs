mod ring;

use crate::alloc::{self, AllocStrategy, Assign, Global, Transfer};
use crate::bounded::ring::Ring;
use crate::error::{AllocError, TryWriteError};
use crate::loom::{Arc, AtomicBool, Ordering};
use crate::Buffer;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

/// A fixed-capacity circular buffer over one contiguous block.
///
/// Every slot holds a live `T` from construction on: writes assign into a
/// slot and reads move the value out, leaving `T::default()` behind. A write
/// to a full ring is dropped; a read from an empty ring returns `None`.
///
/// A ring without storage (the [`Default`] value, or the source of a move)
/// is *detached*: it has capacity 0 and ignores every operation.
///
/// [`peek`](BoundedRing::peek) and `clone` hand out `&T` through `&self`, so
/// the ring is only `Sync` when `T` is:
///
/// ```compile_fail
/// use ring_buffers::BoundedRing;
/// use std::cell::Cell;
///
/// fn assert_sync<S: Sync>(_: &S) {}
///
/// let ring: BoundedRing<Cell<u64>> = BoundedRing::with_capacity(1);
/// assert_sync(&ring);
/// ```
pub struct BoundedRing<T, A: AllocStrategy = Global> {
    ring: Ring<T, A>,
    _not_sync: PhantomData<Cell<()>>,
}

unsafe impl<T: Send + Sync, A: AllocStrategy + Sync> Sync for BoundedRing<T, A> {}

impl<T: Default> BoundedRing<T> {
    /// Allocates `cap` default-constructed slots from the global allocator.
    ///
    /// # Panics
    ///
    /// Panics if the capacity overflows, and aborts through
    /// [`handle_alloc_error`](std::alloc::handle_alloc_error) when memory is
    /// exhausted.
    pub fn with_capacity(cap: usize) -> Self {
        Self::with_capacity_in(cap, Global)
    }
}

impl<T: Default, A: AllocStrategy> BoundedRing<T, A> {
    pub fn with_capacity_in(cap: usize, alloc: A) -> Self {
        match Self::try_with_capacity_in(cap, alloc) {
            Ok(ring) => ring,
            Err(err) => alloc::handle_error::<T>(cap, err),
        }
    }

    pub fn try_with_capacity_in(cap: usize, alloc: A) -> Result<Self, AllocError> {
        let ring = Ring::with_capacity_in(cap, alloc)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(capacity = cap, "bounded ring allocated");
        Ok(Self::from_ring(ring))
    }

    /// Stores `value` unless the ring is full or detached, in which case the
    /// value is dropped and nothing changes.
    pub fn write(&mut self, value: T) {
        if let Err(_err) = self.try_write(value) {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                capacity = self.capacity(),
                reason = %_err,
                "bounded ring write dropped"
            );
        }
    }

    pub fn try_write(&mut self, value: T) -> Result<(), TryWriteError<T>> {
        if self.is_detached() {
            return Err(TryWriteError::detached(value));
        }
        match self.ring.next_idx() {
            // Safety: `&mut self` makes this the only producer.
            Some(idx) => unsafe {
                self.ring.set_unchecked(value, idx);
                Ok(())
            },
            None => Err(TryWriteError::full(value)),
        }
    }

    /// Takes the oldest value out of the ring.
    pub fn read(&mut self) -> Option<T> {
        // Safety: `&mut self` makes this the only consumer.
        unsafe { self.ring.try_pop() }
    }

    /// Drops every stored value; the slots are reset to `T::default()`.
    pub fn clear(&mut self) {
        while self.read().is_some() {}
    }

    /// Move-assignment: releases this ring's storage and takes over the
    /// contents of `source`, which is left detached.
    ///
    /// When the strategy propagates on move, or both strategies are the
    /// same, the block changes hands in O(1). Otherwise the elements are
    /// moved one by one into a block from this ring's strategy.
    pub fn move_from(&mut self, source: &mut Self) {
        let mut strategy = self.ring.allocator().clone();
        let transfer = alloc::propagate(&mut strategy, source.ring.allocator(), Assign::Move);
        let empty = Ring::detached(source.ring.allocator().clone());
        self.ring = match transfer {
            Transfer::Steal => mem::replace(&mut source.ring, empty),
            Transfer::Rebuild => {
                let cap = source.capacity();
                let ring = source
                    .ring
                    .rebuild_in(strategy)
                    .unwrap_or_else(|err| alloc::handle_error::<T>(cap, err));
                source.ring = empty;
                ring
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(?transfer, capacity = self.capacity(), "bounded ring moved");
    }

    /// Splits the ring into a producer and a consumer that may live on two
    /// different threads.
    pub fn split(self) -> (Producer<T, A>, Consumer<T, A>) {
        let shared = Arc::new(Shared {
            ring: self.ring,
            closed: AtomicBool::new(false),
        });
        (
            Producer {
                inner: shared.clone(),
            },
            Consumer { inner: shared },
        )
    }
}

impl<T, A: AllocStrategy> BoundedRing<T, A> {
    fn from_ring(ring: Ring<T, A>) -> Self {
        Self {
            ring,
            _not_sync: PhantomData,
        }
    }

    /// The value `read` would return next.
    pub fn peek(&self) -> Option<&T> {
        // Safety: reading needs `&mut self`, so no pop overlaps the borrow.
        unsafe { self.ring.peek() }
    }

    /// The fixed capacity of the ring.
    pub fn size(&self) -> usize {
        self.ring.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of values currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn is_detached(&self) -> bool {
        self.ring.capacity() == 0
    }

    pub fn allocator(&self) -> &A {
        self.ring.allocator()
    }
}

impl<T, A: AllocStrategy + Default> Default for BoundedRing<T, A> {
    fn default() -> Self {
        Self::from_ring(Ring::detached(A::default()))
    }
}

impl<T: Clone, A: AllocStrategy> Clone for BoundedRing<T, A> {
    fn clone(&self) -> Self {
        let strategy = self.ring.allocator().select_on_copy();
        let ring = self
            .ring
            .clone_in(strategy)
            .unwrap_or_else(|err| alloc::handle_error::<T>(self.capacity(), err));
        Self::from_ring(ring)
    }

    /// Copy-assignment: the old block is always released and a new one of
    /// the source's capacity is allocated.
    fn clone_from(&mut self, source: &Self) {
        let mut strategy = self.ring.allocator().clone();
        alloc::propagate(&mut strategy, source.ring.allocator(), Assign::Copy);
        // Release first so both blocks are never live at once.
        self.ring = Ring::detached(strategy.clone());
        self.ring = source
            .ring
            .clone_in(strategy)
            .unwrap_or_else(|err| alloc::handle_error::<T>(source.capacity(), err));
    }
}

impl<T, A: AllocStrategy> fmt::Debug for BoundedRing<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Default, A: AllocStrategy> Buffer<T> for BoundedRing<T, A> {
    fn push(&mut self, value: T) {
        self.write(value)
    }

    fn pop(&mut self) -> Option<T> {
        self.read()
    }

    fn size(&self) -> usize {
        self.capacity()
    }
}

struct Shared<T, A: AllocStrategy> {
    ring: Ring<T, A>,
    closed: AtomicBool,
}

/// The writing half of a split [`BoundedRing`].
pub struct Producer<T, A: AllocStrategy = Global> {
    inner: Arc<Shared<T, A>>,
}

impl<T, A: AllocStrategy> Drop for Producer<T, A> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl<T, A: AllocStrategy> Producer<T, A> {
    /// Stores `value`, dropping it if the ring is full or the consumer is
    /// gone.
    pub fn write(&mut self, value: T) {
        if let Err(_err) = self.try_write(value) {
            #[cfg(feature = "tracing")]
            tracing::trace!(reason = %_err, "producer write dropped");
        }
    }

    pub fn try_write(&mut self, value: T) -> Result<(), TryWriteError<T>> {
        if self.is_closed() {
            return Err(TryWriteError::detached(value));
        }
        match self.inner.ring.next_idx() {
            // Safety: the producer can not be cloned, and takes `&mut self`.
            Some(idx) => unsafe {
                self.inner.ring.set_unchecked(value, idx);
                Ok(())
            },
            None if self.inner.ring.capacity() == 0 => Err(TryWriteError::detached(value)),
            None => Err(TryWriteError::full(value)),
        }
    }

    pub fn is_full(&self) -> bool {
        self.inner.ring.is_full()
    }

    pub fn len(&self) -> usize {
        self.inner.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.ring.capacity()
    }

    /// Returns whether the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// The reading half of a split [`BoundedRing`].
pub struct Consumer<T, A: AllocStrategy = Global> {
    inner: Arc<Shared<T, A>>,
}

impl<T, A: AllocStrategy> Drop for Consumer<T, A> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl<T: Default, A: AllocStrategy> Consumer<T, A> {
    /// Takes the oldest value. Values written before the producer was
    /// dropped stay readable.
    pub fn read(&mut self) -> Option<T> {
        // Safety: the consumer can not be cloned, and takes `&mut self`.
        unsafe { self.inner.ring.try_pop() }
    }
}

impl<T, A: AllocStrategy> Consumer<T, A> {
    pub fn len(&self) -> usize {
        self.inner.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.ring.capacity()
    }

    /// Returns whether the producer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::alloc::testing::Sticky;
    use crate::alloc::Tracking;

    #[test]
    fn reads_come_back_in_write_order() {
        let mut ring = BoundedRing::with_capacity(3);
        ring.write(1);
        ring.write(2);
        ring.write(3);
        ring.write(4);

        assert_eq!(ring.read(), Some(1));
        assert_eq!(ring.read(), Some(2));
        assert_eq!(ring.read(), Some(3));
        assert_eq!(ring.read(), None);
    }

    #[test]
    fn write_to_full_ring_changes_nothing() {
        let mut ring = BoundedRing::with_capacity(2);
        ring.write(10);
        ring.write(20);
        assert!(ring.is_full());

        let err = ring.try_write(30).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 30);

        ring.write(40);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.peek(), Some(&10));
        assert_eq!(ring.read(), Some(10));
        assert_eq!(ring.read(), Some(20));
    }

    #[test]
    fn read_from_empty_ring_changes_nothing() {
        let mut ring: BoundedRing<u8> = BoundedRing::with_capacity(4);
        assert_eq!(ring.read(), None);
        assert_eq!(ring.read(), None);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);

        ring.write(7);
        assert_eq!(ring.read(), Some(7));
    }

    #[test]
    fn size_is_capacity_not_occupancy() {
        let mut ring = BoundedRing::with_capacity(5);
        assert_eq!(ring.size(), 5);
        ring.write(1);
        assert_eq!(ring.size(), 5);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn full_single_slot_ring_empties_on_one_read() {
        let mut ring = BoundedRing::with_capacity(1);
        ring.write('a');
        assert!(ring.is_full());
        assert!(!ring.is_empty());

        assert_eq!(ring.read(), Some('a'));
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.read(), None);

        ring.write('b');
        assert_eq!(ring.read(), Some('b'));
    }

    #[test]
    fn fill_and_drain_many_rounds() {
        let mut ring = BoundedRing::with_capacity(7);
        let mut next = 0u32;
        for _ in 0..20 {
            for _ in 0..5 {
                ring.write(next);
                next += 1;
            }
            for i in 0..5 {
                assert_eq!(ring.read(), Some(next - 5 + i));
            }
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn zero_capacity_ring_is_detached() {
        let mut ring: BoundedRing<u32> = BoundedRing::with_capacity(0);
        assert!(ring.is_detached());
        assert!(ring.try_write(1).unwrap_err().is_detached());
        assert_eq!(ring.read(), None);
    }

    #[test]
    fn clone_is_independent() {
        let mut ring = BoundedRing::with_capacity(3);
        ring.write(String::from("a"));
        ring.write(String::from("b"));

        let mut copy = ring.clone();
        copy.write(String::from("c"));
        assert_eq!(copy.read().as_deref(), Some("a"));

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.read().as_deref(), Some("a"));
        assert_eq!(ring.read().as_deref(), Some("b"));
        assert_eq!(ring.read(), None);

        assert_eq!(copy.read().as_deref(), Some("b"));
        assert_eq!(copy.read().as_deref(), Some("c"));
    }

    #[test]
    fn clone_from_takes_source_shape() {
        let mut src = BoundedRing::with_capacity(4);
        src.write(1);
        src.write(2);
        let mut dst = BoundedRing::with_capacity(1);
        dst.write(9);

        dst.clone_from(&src);
        assert_eq!(dst.capacity(), 4);
        assert_eq!(dst.read(), Some(1));
        assert_eq!(dst.read(), Some(2));
        assert_eq!(src.len(), 2);
    }

    #[test]
    fn take_leaves_a_detached_ring() {
        let mut ring = BoundedRing::with_capacity(2);
        ring.write(5);

        let mut moved = std::mem::take(&mut ring);
        assert!(ring.is_detached());
        assert_eq!(ring.size(), 0);
        ring.write(6);
        assert_eq!(ring.read(), None);

        assert_eq!(moved.read(), Some(5));
    }

    #[test]
    fn move_from_hands_over_storage() {
        let alloc = Tracking::new();
        let mut src = BoundedRing::with_capacity_in(3, alloc.clone());
        src.write(1u64);
        let mut dst = BoundedRing::with_capacity_in(8, Tracking::new());

        dst.move_from(&mut src);
        assert!(dst.allocator().same_as(&alloc));
        assert_eq!(alloc.live_blocks(), 1);
        assert!(src.is_detached());
        assert_eq!(dst.capacity(), 3);
        assert_eq!(dst.read(), Some(1));

        drop(dst);
        drop(src);
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn drop_releases_every_slot() {
        use std::rc::Rc;

        let alloc = Tracking::new();
        let marker = Rc::new(());
        {
            let mut ring = BoundedRing::with_capacity_in(4, alloc.clone());
            ring.write(Some(marker.clone()));
            ring.write(Some(marker.clone()));
            ring.write(Some(marker.clone()));
            let _ = ring.read();
            assert_eq!(Rc::strong_count(&marker), 3);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn split_halves_see_each_other() {
        let (mut tx, mut rx) = BoundedRing::with_capacity(2).split();
        tx.write(1);
        tx.write(2);
        assert!(tx.try_write(3).unwrap_err().is_full());

        assert_eq!(rx.read(), Some(1));
        tx.write(3);
        drop(tx);

        assert!(rx.is_closed());
        assert_eq!(rx.read(), Some(2));
        assert_eq!(rx.read(), Some(3));
        assert_eq!(rx.read(), None);
    }

    #[test]
    fn move_from_rebuilds_on_a_sticky_strategy() {
        let (a, b) = (Sticky::default(), Sticky::default());
        let mut src = BoundedRing::with_capacity_in(3, a.clone());
        for v in 1..=3 {
            src.write(v);
        }
        assert_eq!(src.read(), Some(1));
        src.write(4);
        let mut dst = BoundedRing::with_capacity_in(5, b.clone());
        dst.write(9);

        dst.move_from(&mut src);
        assert!(dst.allocator().same_as(&b));
        assert!(src.is_detached());
        assert_eq!(a.0.live_blocks(), 0);
        assert_eq!(b.0.live_blocks(), 1);
        assert_eq!(dst.capacity(), 3);
        assert_eq!(dst.read(), Some(2));
        assert_eq!(dst.read(), Some(3));
        assert_eq!(dst.read(), Some(4));
        assert_eq!(dst.read(), None);

        drop(dst);
        assert_eq!(b.0.live_blocks(), 0);
    }

    #[test]
    fn move_from_steals_within_one_sticky_pool() {
        let a = Sticky::default();
        let mut src = BoundedRing::with_capacity_in(2, a.clone());
        src.write(1);
        let mut dst = BoundedRing::with_capacity_in(2, a.clone());

        dst.move_from(&mut src);
        assert_eq!(a.0.live_blocks(), 1);
        assert_eq!(a.0.total_blocks(), 2);
        assert_eq!(dst.read(), Some(1));
    }

    #[test]
    fn clone_from_keeps_a_sticky_strategy() {
        let (a, b) = (Sticky::default(), Sticky::default());
        let mut src = BoundedRing::with_capacity_in(4, a.clone());
        src.write(1);
        src.write(2);
        let mut dst = BoundedRing::with_capacity_in(1, b.clone());
        dst.write(9);

        dst.clone_from(&src);
        assert!(dst.allocator().same_as(&b));
        assert!(!dst.allocator().same_as(&a));
        assert_eq!(a.0.live_blocks(), 1);
        assert_eq!(b.0.live_blocks(), 1);
        assert_eq!(dst.read(), Some(1));
        assert_eq!(dst.read(), Some(2));
        assert_eq!(src.len(), 2);

        drop(src);
        drop(dst);
        assert_eq!(a.0.live_blocks(), 0);
        assert_eq!(b.0.live_blocks(), 0);
    }

    #[test]
    fn clone_from_adopts_a_tracking_strategy() {
        let (a, b) = (Tracking::new(), Tracking::new());
        let mut src = BoundedRing::with_capacity_in(2, a.clone());
        src.write(1);
        let mut dst = BoundedRing::with_capacity_in(2, b.clone());

        dst.clone_from(&src);
        assert!(dst.allocator().same_as(&a));
        assert_eq!(a.live_blocks(), 2);
        assert_eq!(b.live_blocks(), 0);
    }

    #[test]
    fn thread_safety_follows_element_type() {
        fn assert_send<S: Send>() {}
        fn assert_sync<S: Sync>() {}

        assert_send::<BoundedRing<Cell<u64>>>();
        assert_sync::<BoundedRing<u64>>();
        assert_send::<Producer<Cell<u64>>>();
        assert_send::<Consumer<Cell<u64>>>();
    }

    #[test]
    fn producer_sees_dropped_consumer() {
        let (mut tx, rx) = BoundedRing::<u8>::with_capacity(2).split();
        drop(rx);
        assert!(tx.is_closed());
        assert!(tx.try_write(1).unwrap_err().is_detached());
    }
}
