//! Pluggable allocation strategies.
//!
//! Both rings take their memory from an [`AllocStrategy`]. The strategy is
//! untyped: it hands out blocks for a [`Layout`], so the same value serves
//! the contiguous slot block of a [`BoundedRing`](crate::BoundedRing) and
//! the node arena of a [`LinkedRing`](crate::LinkedRing).
//!
//! Copy- and move-assignment of a ring (`clone_from` / `move_from`) consult
//! the strategy's propagation constants through [`propagate`], the one place
//! where that decision is made.

use crate::error::AllocError;
use std::alloc::{handle_alloc_error, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A source of memory and of element construction for the rings.
///
/// # Safety
///
/// `allocate` must return a block valid for `layout` until it is passed back
/// to `deallocate` with the same layout, on this strategy or on any strategy
/// for which [`same_as`](AllocStrategy::same_as) returns `true`.
pub unsafe trait AllocStrategy: Clone {
    /// Whether `clone_from` adopts the source ring's strategy.
    const PROPAGATE_ON_COPY_ASSIGN: bool = false;

    /// Whether `move_from` adopts the source ring's strategy.
    const PROPAGATE_ON_MOVE_ASSIGN: bool = true;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must come from `allocate` with the same `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Constructs `value` in place.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes and properly aligned.
    unsafe fn construct<T>(&self, ptr: *mut T, value: T) {
        ptr.write(value)
    }

    /// Destroys the value at `ptr` in place.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live value that is not used afterwards.
    unsafe fn destroy<T>(&self, ptr: *mut T) {
        ptr::drop_in_place(ptr)
    }

    /// The strategy a copy of a ring should use.
    fn select_on_copy(&self) -> Self {
        self.clone()
    }

    /// Whether memory from `other` may be released through `self`.
    fn same_as(&self, _other: &Self) -> bool {
        true
    }
}

/// The process-wide allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl AllocStrategy for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::Exhausted { size: 0 });
        }
        // Safety: the layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::Exhausted {
            size: layout.size(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

#[derive(Debug, Default)]
struct Stats {
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    total_blocks: AtomicUsize,
}

/// A [`Global`]-backed strategy that counts what it hands out.
///
/// Clones share one set of counters and compare equal through
/// [`same_as`](AllocStrategy::same_as); [`Tracking::new`] starts a fresh,
/// distinct pool. Propagates on both copy and move assignment.
#[derive(Clone, Debug, Default)]
pub struct Tracking {
    stats: Arc<Stats>,
}

impl Tracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks allocated and not yet released.
    pub fn live_blocks(&self) -> usize {
        self.stats.live_blocks.load(Ordering::Acquire)
    }

    pub fn live_bytes(&self) -> usize {
        self.stats.live_bytes.load(Ordering::Acquire)
    }

    /// Blocks allocated over the lifetime of the pool.
    pub fn total_blocks(&self) -> usize {
        self.stats.total_blocks.load(Ordering::Acquire)
    }
}

unsafe impl AllocStrategy for Tracking {
    const PROPAGATE_ON_COPY_ASSIGN: bool = true;
    const PROPAGATE_ON_MOVE_ASSIGN: bool = true;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = Global.allocate(layout)?;
        self.stats.live_blocks.fetch_add(1, Ordering::AcqRel);
        self.stats.total_blocks.fetch_add(1, Ordering::AcqRel);
        self.stats
            .live_bytes
            .fetch_add(layout.size(), Ordering::AcqRel);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        Global.deallocate(ptr, layout);
        self.stats.live_blocks.fetch_sub(1, Ordering::AcqRel);
        self.stats
            .live_bytes
            .fetch_sub(layout.size(), Ordering::AcqRel);
    }

    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stats, &other.stats)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Assign {
    Copy,
    Move,
}

/// How the destination of an assignment obtains the source's elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transfer {
    /// Take over the source's storage as is.
    Steal,
    /// Allocate fresh storage from the destination's strategy.
    Rebuild,
}

/// Applies the propagation rule of `kind` to the destination strategy `dst`
/// and decides how the elements travel.
pub(crate) fn propagate<A: AllocStrategy>(dst: &mut A, src: &A, kind: Assign) -> Transfer {
    match kind {
        Assign::Copy => {
            if A::PROPAGATE_ON_COPY_ASSIGN {
                *dst = src.select_on_copy();
            }
            Transfer::Rebuild
        }
        Assign::Move => {
            if A::PROPAGATE_ON_MOVE_ASSIGN {
                *dst = src.clone();
                Transfer::Steal
            } else if dst.same_as(src) {
                Transfer::Steal
            } else {
                Transfer::Rebuild
            }
        }
    }
}

/// Allocates room for `n` values of `T`; zero-sized requests never reach
/// the strategy.
pub(crate) fn allocate_array<T, A: AllocStrategy>(
    alloc: &A,
    n: usize,
) -> Result<NonNull<T>, AllocError> {
    let layout = Layout::array::<T>(n).map_err(|_| AllocError::CapacityOverflow)?;
    if layout.size() == 0 {
        return Ok(NonNull::dangling());
    }
    alloc.allocate(layout).map(NonNull::cast)
}

/// # Safety
///
/// `ptr` must come from [`allocate_array`] with the same `alloc` and `n`.
pub(crate) unsafe fn deallocate_array<T, A: AllocStrategy>(alloc: &A, ptr: NonNull<T>, n: usize) {
    if let Ok(layout) = Layout::array::<T>(n) {
        if layout.size() != 0 {
            alloc.deallocate(ptr.cast(), layout);
        }
    }
}

/// Turns an allocation failure of `n` values of `T` into the process-level
/// failure path.
pub(crate) fn handle_error<T>(n: usize, err: AllocError) -> ! {
    match (err, Layout::array::<T>(n)) {
        (AllocError::Exhausted { .. }, Ok(layout)) => handle_alloc_error(layout),
        _ => panic!("capacity overflow"),
    }
}
