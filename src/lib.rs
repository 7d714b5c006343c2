//! Two allocator-pluggable ring buffers behind one small interface.
//!
//! - [`BoundedRing`]: a fixed number of contiguous slots. Writes to a full
//!   ring are dropped. It can be [split](BoundedRing::split) into a
//!   single producer and a single consumer.
//! - [`LinkedRing`]: a lock-guarded circular linked ring that grows by one
//!   node per push and reads the most recently pushed value first.
//!
//! Both draw memory from an [`AllocStrategy`] and implement [`Buffer`].
//!
//! ```
//! use ring_buffers::{BoundedRing, Buffer, LinkedRing};
//!
//! let mut bounded = BoundedRing::with_capacity(2);
//! bounded.push(1);
//! bounded.push(2);
//! bounded.push(3); // dropped, the ring is full
//! assert_eq!(bounded.pop(), Some(1));
//!
//! let linked = LinkedRing::new();
//! linked.push_next(1);
//! linked.push_next(2);
//! assert_eq!(linked.read_current(), Some(2));
//! assert_eq!(linked.read_current(), Some(1));
//! ```

pub mod alloc;
pub mod bounded;
pub mod error;
pub mod linked;
mod loom;
pub mod wrapper;

pub use crate::alloc::{AllocStrategy, Global, Tracking};
pub use crate::bounded::{BoundedRing, Consumer, Producer};
pub use crate::error::{AllocError, TryWriteError, WriteError};
pub use crate::linked::LinkedRing;
pub use crate::wrapper::{BufferSink, Drain};

/// The operations both rings share.
pub trait Buffer<T> {
    /// Inserts one value, following the ring's overflow policy.
    fn push(&mut self, value: T);

    /// Removes and returns the value the ring reads next.
    fn pop(&mut self) -> Option<T>;

    /// Capacity for a bounded ring, node count for a linked ring.
    fn size(&self) -> usize;
}
