use self::inner::AtomicPos;
use crate::alloc::{self, AllocStrategy};
use crate::error::AllocError;
use crate::loom::{Ordering, UnsafeCell};
use std::mem;
use std::ptr::NonNull;

#[cfg(feature = "cache-padded")]
mod inner {
    use crate::loom::AtomicUsize;
    use cache_padded::CachePadded;
    use core::ops::Deref;

    #[derive(Default)]
    pub(crate) struct AtomicPos {
        inner: CachePadded<AtomicUsize>,
    }

    impl Deref for AtomicPos {
        type Target = AtomicUsize;

        fn deref(&self) -> &Self::Target {
            &self.inner
        }
    }
}

#[cfg(not(feature = "cache-padded"))]
mod inner {
    use crate::loom::AtomicUsize;
    use core::ops::Deref;

    #[derive(Default)]
    pub(crate) struct AtomicPos {
        inner: AtomicUsize,
    }

    impl Deref for AtomicPos {
        type Target = AtomicUsize;

        fn deref(&self) -> &Self::Target {
            &self.inner
        }
    }
}

unsafe impl<T: Send, A: AllocStrategy + Send> Send for Ring<T, A> {}

unsafe impl<T: Send, A: AllocStrategy + Sync> Sync for Ring<T, A> {}

/// A block of `cap` always-live slots and two cursors.
///
/// Positions run over `[0, 2 * cap)`, so `producer == consumer` means empty
/// and a distance of `cap` means full. The producer side only stores
/// `producer_pos` and the consumer side only stores `consumer_pos`.
pub(crate) struct Ring<T, A: AllocStrategy> {
    buf: NonNull<UnsafeCell<T>>,
    cap: usize,
    alloc: A,
    producer_pos: AtomicPos,
    consumer_pos: AtomicPos,
}

impl<T, A: AllocStrategy> Ring<T, A> {
    /// A ring without storage. Every write is dropped and every read misses.
    pub(crate) fn detached(alloc: A) -> Self {
        Self::from_raw(NonNull::dangling(), 0, alloc)
    }

    pub(crate) fn with_capacity_in(cap: usize, alloc: A) -> Result<Self, AllocError>
    where
        T: Default,
    {
        cap.checked_mul(2).ok_or(AllocError::CapacityOverflow)?;
        let buf = fill(&alloc, cap, |_| T::default())?;
        Ok(Self::from_raw(buf, cap, alloc))
    }

    fn from_raw(buf: NonNull<UnsafeCell<T>>, cap: usize, alloc: A) -> Self {
        Self {
            buf,
            cap,
            alloc,
            producer_pos: Default::default(),
            consumer_pos: Default::default(),
        }
    }

    /// Deep copy of every slot into storage from `alloc`.
    pub(crate) fn clone_in(&self, alloc: A) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        let buf = fill(&alloc, self.cap, |idx| unsafe {
            self.slot(idx).with(|ptr| (*ptr).clone())
        })?;
        let ring = Self::from_raw(buf, self.cap, alloc);
        ring.copy_cursors(self);
        Ok(ring)
    }

    /// Moves every slot into storage from `alloc`, leaving defaults behind.
    pub(crate) fn rebuild_in(&mut self, alloc: A) -> Result<Self, AllocError>
    where
        T: Default,
    {
        let src = &*self;
        let buf = fill(&alloc, src.cap, |idx| unsafe {
            src.slot(idx).with_mut(|ptr| mem::take(&mut *ptr))
        })?;
        let ring = Self::from_raw(buf, self.cap, alloc);
        ring.copy_cursors(self);
        Ok(ring)
    }

    fn copy_cursors(&self, other: &Self) {
        self.producer_pos
            .store(other.producer_pos(), Ordering::Release);
        self.consumer_pos
            .store(other.consumer_pos(), Ordering::Release);
    }

    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    pub(crate) fn len(&self) -> usize {
        let producer = self.producer_pos();
        let consumer = self.consumer_pos();
        if producer >= consumer {
            producer - consumer
        } else {
            producer + 2 * self.cap - consumer
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.consumer_pos() == self.producer_pos()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.cap != 0 && self.len() == self.cap
    }

    pub(crate) fn next_idx(&self) -> Option<usize> {
        if self.cap == 0 || self.is_full() {
            None
        } else {
            Some(self.index(self.producer_pos()))
        }
    }

    /// # Safety
    ///
    /// Only the single producer may call this, with an index just returned
    /// by [`next_idx`](Self::next_idx).
    pub(crate) unsafe fn set_unchecked(&self, t: T, idx: usize) {
        self.slot(idx).with_mut(|ptr| *ptr = t);
        let now = self.producer_pos.load(Ordering::Acquire);
        self.producer_pos.store(self.advance(now), Ordering::Release);
    }

    /// # Safety
    ///
    /// Only the single consumer may call this.
    pub(crate) unsafe fn try_pop(&self) -> Option<T>
    where
        T: Default,
    {
        if self.is_empty() {
            None
        } else {
            let now = self.consumer_pos.load(Ordering::Acquire);
            let t = self
                .slot(self.index(now))
                .with_mut(|ptr| mem::take(&mut *ptr));
            self.consumer_pos.store(self.advance(now), Ordering::Release);
            Some(t)
        }
    }

    /// # Safety
    ///
    /// Only the single consumer may call this, and it must not pop while the
    /// reference is alive.
    pub(crate) unsafe fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            let idx = self.index(self.consumer_pos());
            let ptr = self.slot(idx).with(|ptr| ptr);
            Some(&*ptr)
        }
    }

    fn advance(&self, pos: usize) -> usize {
        let next = pos + 1;
        if next == 2 * self.cap {
            0
        } else {
            next
        }
    }

    fn index(&self, pos: usize) -> usize {
        if pos >= self.cap {
            pos - self.cap
        } else {
            pos
        }
    }

    unsafe fn slot(&self, idx: usize) -> &UnsafeCell<T> {
        debug_assert!(idx < self.cap);
        &*self.buf.as_ptr().add(idx)
    }

    fn consumer_pos(&self) -> usize {
        self.consumer_pos.load(Ordering::Acquire)
    }

    fn producer_pos(&self) -> usize {
        self.producer_pos.load(Ordering::Acquire)
    }
}

impl<T, A: AllocStrategy> Drop for Ring<T, A> {
    fn drop(&mut self) {
        unsafe {
            for idx in 0..self.cap {
                self.alloc.destroy(self.buf.as_ptr().add(idx));
            }
            alloc::deallocate_array(&self.alloc, self.buf, self.cap);
        }
    }
}

/// Allocates `cap` slots from `alloc` and constructs slot `i` from `f(i)`.
fn fill<T, A, F>(alloc: &A, cap: usize, mut f: F) -> Result<NonNull<UnsafeCell<T>>, AllocError>
where
    A: AllocStrategy,
    F: FnMut(usize) -> T,
{
    // Releases what was built so far if `f` panics.
    struct Partial<'a, T, A: AllocStrategy> {
        alloc: &'a A,
        buf: NonNull<UnsafeCell<T>>,
        cap: usize,
        init: usize,
    }

    impl<T, A: AllocStrategy> Drop for Partial<'_, T, A> {
        fn drop(&mut self) {
            unsafe {
                for idx in 0..self.init {
                    self.alloc.destroy(self.buf.as_ptr().add(idx));
                }
                alloc::deallocate_array(self.alloc, self.buf, self.cap);
            }
        }
    }

    let buf = alloc::allocate_array::<UnsafeCell<T>, A>(alloc, cap)?;
    let mut partial = Partial {
        alloc,
        buf,
        cap,
        init: 0,
    };
    while partial.init < cap {
        let value = f(partial.init);
        unsafe {
            alloc.construct(buf.as_ptr().add(partial.init), UnsafeCell::new(value));
        }
        partial.init += 1;
    }
    mem::forget(partial);
    Ok(buf)
}
