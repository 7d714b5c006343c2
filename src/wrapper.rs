use crate::error::WriteError;
use crate::Buffer;
use futures_sink::Sink;
use futures_util::Stream;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Feeds a [`Buffer`] from async code.
///
/// The sink never waits: it is always ready, and every item goes through
/// [`Buffer::push`], so a full bounded ring still drops it. After
/// `poll_close` every send fails with [`WriteError::Detached`], while the
/// buffer and what was written to it stay available through
/// [`into_inner`](BufferSink::into_inner).
pub struct BufferSink<B> {
    inner: B,
    closed: bool,
}

impl<B> BufferSink<B> {
    pub fn new(buffer: B) -> Self {
        Self {
            inner: buffer,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Gives the buffer back, closed or not.
    pub fn into_inner(self) -> B {
        self.inner
    }

    fn check_open(&self) -> Poll<Result<(), WriteError>> {
        if self.closed {
            Poll::Ready(Err(WriteError::Detached))
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

impl<T, B> Sink<T> for BufferSink<B>
where
    B: Buffer<T> + Unpin,
{
    type Error = WriteError;

    fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.check_open()
    }

    fn start_send(mut self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        if self.closed {
            return Err(WriteError::Detached);
        }
        self.inner.push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.check_open()
    }

    fn poll_close(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.closed = true;
        Poll::Ready(Ok(()))
    }
}

/// A stream of [`Buffer::pop`] results that ends at the first `None`.
pub struct Drain<'a, B, T> {
    buffer: &'a mut B,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, B: Buffer<T>, T> Drain<'a, B, T> {
    pub fn new(buffer: &'a mut B) -> Self {
        Self {
            buffer,
            _marker: PhantomData,
        }
    }
}

impl<B: Buffer<T>, T> Stream for Drain<'_, B, T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.buffer.pop())
    }
}
