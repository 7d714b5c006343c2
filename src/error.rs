use std::fmt;

/// The allocation strategy could not provide a block.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("allocation of {size} bytes failed")]
    Exhausted { size: usize },
    #[error("requested capacity overflows the address space")]
    CapacityOverflow,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("write failed because ring is full")]
    Full,
    #[error("write failed because ring has no storage or its reader is gone")]
    Detached,
}

impl WriteError {
    pub fn is_full(&self) -> bool {
        matches!(&self, WriteError::Full)
    }

    pub fn is_detached(&self) -> bool {
        matches!(&self, WriteError::Detached)
    }
}

/// A rejected write, handing the value back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct TryWriteError<T> {
    pub(crate) err: WriteError,
    pub(crate) val: T,
}

impl<T> fmt::Debug for TryWriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryWriteError")
            .field("kind", &self.err)
            .finish()
    }
}

impl<T> fmt::Display for TryWriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl<T> std::error::Error for TryWriteError<T> {}

impl<T> TryWriteError<T> {
    pub(crate) fn full(val: T) -> Self {
        Self {
            err: WriteError::Full,
            val,
        }
    }

    pub(crate) fn detached(val: T) -> Self {
        Self {
            err: WriteError::Detached,
            val,
        }
    }

    pub fn is_full(&self) -> bool {
        self.err.is_full()
    }

    pub fn is_detached(&self) -> bool {
        self.err.is_detached()
    }

    pub fn into_inner(self) -> T {
        self.val
    }

    pub fn into_write_error(self) -> WriteError {
        self.err
    }
}
