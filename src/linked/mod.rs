mod arena;

use crate::alloc::{self, AllocStrategy, Assign, Global, Transfer};
use crate::linked::arena::Arena;
use crate::loom::{Mutex, MutexGuard};
use crate::Buffer;
use std::fmt;
use std::mem;
use std::sync::PoisonError;

/// A growable circular doubly-linked ring.
///
/// One cursor, `current`, is both the last insertion point and the read
/// head: [`push_next`](LinkedRing::push_next) links a node right after it
/// and moves onto the new node, so the value pushed last is the value read
/// next. Reading walks the ring without removing anything.
///
/// Every method takes `&self` and serializes on a lock owned by this
/// instance. Copies and moves get their own lock.
pub struct LinkedRing<T, A: AllocStrategy = Global> {
    inner: Mutex<Inner<T, A>>,
}

struct Inner<T, A: AllocStrategy> {
    nodes: Arena<T, A>,
    current: Option<usize>,
}

impl<T, A: AllocStrategy> Inner<T, A> {
    fn new_in(alloc: A) -> Self {
        Self {
            nodes: Arena::new_in(alloc),
            current: None,
        }
    }

    fn link_next(&mut self, value: T) {
        let idx = self.nodes.insert(value);
        if let Some(current) = self.current {
            let next = self.nodes.next(current);
            self.nodes.set_next(idx, next);
            self.nodes.set_prev(idx, current);
            self.nodes.set_next(current, idx);
            self.nodes.set_prev(next, idx);
        }
        self.current = Some(idx);
    }

    fn read(&mut self) -> Option<T>
    where
        T: Clone,
    {
        let current = self.current?;
        let value = self.nodes.value(current).clone();
        self.current = Some(self.nodes.next(current));
        Some(value)
    }

    /// Removes the current node, compacting the arena once it runs sparse.
    fn take(&mut self) -> Option<T> {
        let value = self.unlink_current()?;
        self.shrink_if_sparse();
        Some(value)
    }

    fn unlink_current(&mut self) -> Option<T> {
        let current = self.current?;
        let next = self.nodes.next(current);
        let prev = self.nodes.prev(current);
        let value = self.nodes.remove(current);
        if self.nodes.is_empty() {
            self.current = None;
        } else {
            self.nodes.set_next(prev, next);
            self.nodes.set_prev(next, prev);
            self.current = Some(next);
        }
        Some(value)
    }

    /// After a run of `link_next` calls, points `current` back at the first
    /// value of the run so reads follow insertion order.
    fn rewind_to(&mut self, first: Option<usize>) {
        if first.is_some() {
            self.current = first;
        }
    }

    /// An independent ring with the same read order and current value.
    fn cloned_in(&self, alloc: A) -> Self
    where
        T: Clone,
    {
        let mut copy = Self {
            nodes: Arena::with_capacity_in(alloc, self.nodes.len()),
            current: None,
        };
        let mut first = None;
        let mut idx = self.current;
        for _ in 0..self.nodes.len() {
            let Some(at) = idx else { break };
            copy.link_next(self.nodes.value(at).clone());
            first = first.or(copy.current);
            idx = Some(self.nodes.next(at));
        }
        copy.rewind_to(first);
        copy
    }

    /// Moves the nodes into a block about twice their number, keeping the
    /// read order and the current value.
    fn shrink_if_sparse(&mut self) {
        if self.nodes.is_sparse() {
            let strategy = self.nodes.allocator().clone();
            let nodes = Arena::with_capacity_in(strategy, self.nodes.len() * 2);
            *self = self.drain_into(nodes);
        }
    }

    /// Moves every value of `self`, in read order, into a ring on `alloc`.
    fn drain_in(&mut self, alloc: A) -> Self {
        let len = self.nodes.len();
        self.drain_into(Arena::with_capacity_in(alloc, len))
    }

    fn drain_into(&mut self, nodes: Arena<T, A>) -> Self {
        let mut copy = Self {
            nodes,
            current: None,
        };
        let mut first = None;
        while let Some(value) = self.unlink_current() {
            copy.link_next(value);
            first = first.or(copy.current);
        }
        copy.rewind_to(first);
        copy
    }
}

impl<T> LinkedRing<T> {
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<T, A: AllocStrategy> LinkedRing<T, A> {
    pub fn new_in(alloc: A) -> Self {
        Self {
            inner: Mutex::new(Inner::new_in(alloc)),
        }
    }

    // A panic inside `T::clone` or `T::drop` never leaves the ring half
    // linked, so a poisoned lock still guards a consistent ring.
    fn lock(&self) -> MutexGuard<'_, Inner<T, A>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Links `value` right after the current node and makes it current.
    pub fn push_next(&self, value: T) {
        self.lock().link_next(value);
    }

    /// Pushes every value of `values` under one lock acquisition, as if by
    /// repeated [`push_next`](LinkedRing::push_next).
    pub fn push_round<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut inner = self.lock();
        for value in values {
            inner.link_next(value);
        }
    }

    /// Pushes clones of the first `count` values of `values`.
    pub fn push_round_slice(&self, values: &[T], count: usize)
    where
        T: Clone,
    {
        self.push_round(values.iter().take(count).cloned());
    }

    /// Returns a copy of the current value and moves `current` to its next
    /// neighbour. The node stays in the ring.
    pub fn read_current(&self) -> Option<T>
    where
        T: Clone,
    {
        self.lock().read()
    }

    /// Removes up to `count` nodes starting at the current one. Returns
    /// `false` only when the ring was already empty.
    pub fn delete_current(&self, count: usize) -> bool {
        let mut inner = self.lock();
        if inner.current.is_none() {
            return false;
        }
        for _ in 0..count {
            if inner.unlink_current().is_none() {
                break;
            }
        }
        inner.shrink_if_sparse();
        true
    }

    /// Removes the current node and returns its value; `current` moves to
    /// the next neighbour.
    pub fn take_current(&self) -> Option<T> {
        self.lock().take()
    }

    /// Number of nodes in the ring.
    pub fn size(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().current.is_none()
    }

    /// Drops every node and releases the node storage.
    pub fn clear(&self) {
        let mut inner = self.lock();
        while inner.unlink_current().is_some() {}
    }

    /// A clone of the strategy in use.
    ///
    /// Unlike [`BoundedRing::allocator`](crate::BoundedRing::allocator) this
    /// can not lend a reference, since the strategy lives behind the lock.
    pub fn allocator(&self) -> A {
        self.lock().nodes.allocator().clone()
    }

    /// Move-assignment: drops this ring's nodes and takes over the nodes of
    /// `source`, which is left empty.
    ///
    /// When the strategy propagates on move, or both strategies are the
    /// same, the arena changes hands in O(1). Otherwise every value is moved
    /// into fresh nodes from this ring's strategy.
    pub fn move_from(&mut self, source: &mut Self) {
        let mut dst = self.lock();
        let mut src = source.lock();
        let mut strategy = dst.nodes.allocator().clone();
        let transfer = alloc::propagate(&mut strategy, src.nodes.allocator(), Assign::Move);
        let empty = Inner::new_in(src.nodes.allocator().clone());
        *dst = match transfer {
            Transfer::Steal => mem::replace(&mut *src, empty),
            Transfer::Rebuild => {
                let moved = src.drain_in(strategy);
                *src = empty;
                moved
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(?transfer, size = dst.nodes.len(), "linked ring moved");
    }
}

impl<T, A: AllocStrategy + Default> Default for LinkedRing<T, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<T: Clone, A: AllocStrategy> Clone for LinkedRing<T, A> {
    fn clone(&self) -> Self {
        let inner = self.lock();
        let copy = inner.cloned_in(inner.nodes.allocator().select_on_copy());
        Self {
            inner: Mutex::new(copy),
        }
    }

    /// Copy-assignment: this ring's nodes are always dropped and rebuilt from
    /// `source`.
    fn clone_from(&mut self, source: &Self) {
        let mut dst = self.lock();
        let src = source.lock();
        let mut strategy = dst.nodes.allocator().clone();
        alloc::propagate(&mut strategy, src.nodes.allocator(), Assign::Copy);
        *dst = Inner::new_in(strategy.clone());
        *dst = src.cloned_in(strategy);
    }
}

impl<T, A: AllocStrategy> fmt::Debug for LinkedRing<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedRing")
            .field("size", &self.size())
            .finish()
    }
}

impl<T, A: AllocStrategy> Buffer<T> for LinkedRing<T, A> {
    fn push(&mut self, value: T) {
        self.push_next(value)
    }

    fn pop(&mut self) -> Option<T> {
        self.take_current()
    }

    fn size(&self) -> usize {
        LinkedRing::size(self)
    }
}
