use crate::alloc::{self, AllocStrategy};
use std::mem;
use std::ptr::NonNull;

const MIN_SLOTS: usize = 4;

enum Slot<T> {
    Occupied { value: T, next: usize, prev: usize },
    Vacant { next_free: Option<usize> },
}

/// Node storage for [`LinkedRing`](crate::LinkedRing).
///
/// Nodes live in one block of slots taken from the allocation strategy and
/// refer to each other by slot index. Removed slots go on a free list and
/// are reused before the block grows. All `cap` slots are always
/// constructed, either occupied or vacant. The block goes back to the
/// strategy as soon as the last node is removed.
pub(crate) struct Arena<T, A: AllocStrategy> {
    slots: NonNull<Slot<T>>,
    cap: usize,
    len: usize,
    free: Option<usize>,
    alloc: A,
}

unsafe impl<T: Send, A: AllocStrategy + Send> Send for Arena<T, A> {}

unsafe impl<T: Sync, A: AllocStrategy + Sync> Sync for Arena<T, A> {}

impl<T, A: AllocStrategy> Arena<T, A> {
    pub(crate) fn new_in(alloc: A) -> Self {
        Self {
            slots: NonNull::dangling(),
            cap: 0,
            len: 0,
            free: None,
            alloc,
        }
    }

    /// An arena with room for at least `cap` nodes before it grows.
    pub(crate) fn with_capacity_in(alloc: A, cap: usize) -> Self {
        let mut arena = Self::new_in(alloc);
        if cap > 0 {
            arena.grow_to(cap.max(MIN_SLOTS));
        }
        arena
    }

    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether fewer than a quarter of the slots hold a node.
    pub(crate) fn is_sparse(&self) -> bool {
        self.cap > MIN_SLOTS && self.len * 4 < self.cap
    }

    /// Stores `value` in a self-linked node and returns its index.
    pub(crate) fn insert(&mut self, value: T) -> usize {
        let idx = match self.free {
            Some(idx) => idx,
            None => self.grow(),
        };
        let next_free = match self.slot(idx) {
            Slot::Vacant { next_free } => *next_free,
            Slot::Occupied { .. } => unreachable!("free list points at occupied slot {}", idx),
        };
        *self.slot_mut(idx) = Slot::Occupied {
            value,
            next: idx,
            prev: idx,
        };
        self.free = next_free;
        self.len += 1;
        idx
    }

    /// Takes the node at `idx` out of the arena. The caller relinks its
    /// neighbours. Removing the last node releases the block.
    pub(crate) fn remove(&mut self, idx: usize) -> T {
        let vacant = Slot::Vacant {
            next_free: self.free,
        };
        let value = match mem::replace(self.slot_mut(idx), vacant) {
            Slot::Occupied { value, .. } => value,
            Slot::Vacant { .. } => unreachable!("removing vacant slot {}", idx),
        };
        self.free = Some(idx);
        self.len -= 1;
        if self.len == 0 {
            self.release();
        }
        value
    }

    pub(crate) fn value(&self, idx: usize) -> &T {
        match self.slot(idx) {
            Slot::Occupied { value, .. } => value,
            Slot::Vacant { .. } => unreachable!("reading vacant slot {}", idx),
        }
    }

    pub(crate) fn next(&self, idx: usize) -> usize {
        self.links(idx).0
    }

    pub(crate) fn prev(&self, idx: usize) -> usize {
        self.links(idx).1
    }

    /// `(next, prev)` of the node at `idx`.
    fn links(&self, idx: usize) -> (usize, usize) {
        match self.slot(idx) {
            Slot::Occupied { next, prev, .. } => (*next, *prev),
            Slot::Vacant { .. } => unreachable!("vacant slot {} is not linked", idx),
        }
    }

    pub(crate) fn set_next(&mut self, idx: usize, to: usize) {
        match self.slot_mut(idx) {
            Slot::Occupied { next, .. } => *next = to,
            Slot::Vacant { .. } => unreachable!("linking from vacant slot {}", idx),
        }
    }

    pub(crate) fn set_prev(&mut self, idx: usize, to: usize) {
        match self.slot_mut(idx) {
            Slot::Occupied { prev, .. } => *prev = to,
            Slot::Vacant { .. } => unreachable!("linking from vacant slot {}", idx),
        }
    }

    /// Doubles the block and returns the first new slot.
    fn grow(&mut self) -> usize {
        let new_cap = if self.cap == 0 {
            MIN_SLOTS
        } else {
            self.cap
                .checked_mul(2)
                .unwrap_or_else(|| panic!("capacity overflow"))
        };
        self.grow_to(new_cap)
    }

    /// Moves the slots into a block of `new_cap`, chains the new slots into
    /// the free list and returns the first of them.
    fn grow_to(&mut self, new_cap: usize) -> usize {
        debug_assert!(new_cap > self.cap);
        let slots = alloc::allocate_array::<Slot<T>, A>(&self.alloc, new_cap)
            .unwrap_or_else(|err| alloc::handle_error::<Slot<T>>(new_cap, err));

        unsafe {
            // Occupied slots move bitwise; the old block is released without
            // running any destructor.
            std::ptr::copy_nonoverlapping(self.slots.as_ptr(), slots.as_ptr(), self.cap);
            for idx in self.cap..new_cap {
                let next_free = if idx + 1 < new_cap {
                    Some(idx + 1)
                } else {
                    self.free
                };
                self.alloc
                    .construct(slots.as_ptr().add(idx), Slot::Vacant { next_free });
            }
            alloc::deallocate_array(&self.alloc, self.slots, self.cap);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(from = self.cap, to = new_cap, "linked ring arena grown");

        let first = self.cap;
        self.slots = slots;
        self.cap = new_cap;
        self.free = Some(first);
        first
    }

    /// Destroys every slot and hands the block back to the strategy.
    fn release(&mut self) {
        unsafe {
            for idx in 0..self.cap {
                self.alloc.destroy(self.slots.as_ptr().add(idx));
            }
            alloc::deallocate_array(&self.alloc, self.slots, self.cap);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(slots = self.cap, "linked ring arena released");

        self.slots = NonNull::dangling();
        self.cap = 0;
        self.len = 0;
        self.free = None;
    }

    fn slot(&self, idx: usize) -> &Slot<T> {
        assert!(idx < self.cap, "slot {} out of {}", idx, self.cap);
        unsafe { &*self.slots.as_ptr().add(idx) }
    }

    fn slot_mut(&mut self, idx: usize) -> &mut Slot<T> {
        assert!(idx < self.cap, "slot {} out of {}", idx, self.cap);
        unsafe { &mut *self.slots.as_ptr().add(idx) }
    }
}

impl<T, A: AllocStrategy> Drop for Arena<T, A> {
    fn drop(&mut self) {
        self.release();
    }
}
