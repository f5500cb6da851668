//! Per-thread execution streams with scoped push/pop

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// An execution queue. Stream 0 is the default stream of every thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stream {
    id: u64,
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

impl Stream {
    pub const DEFAULT: Stream = Stream { id: 0 };

    /// A fresh stream, distinct from every other stream of the process.
    pub fn new() -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_default(&self) -> bool {
        self.id == 0
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream::DEFAULT
    }
}

thread_local! {
    static CURRENT_STREAM: Cell<Stream> = const { Cell::new(Stream::DEFAULT) };
}

/// The stream work issued from this thread goes to.
pub fn current_stream() -> Stream {
    CURRENT_STREAM.with(Cell::get)
}

/// Makes `stream` current for the calling thread until dropped; the previous
/// stream is restored on every exit path, unwinding included.
#[must_use = "the stream is popped as soon as the guard is dropped"]
pub struct ScopedStream {
    previous: Stream,
    // Guards are tied to the thread that pushed them.
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ScopedStream {
    pub fn new(stream: Stream) -> Self {
        let previous = CURRENT_STREAM.with(|current| current.replace(stream));
        Self {
            previous,
            _not_send: std::marker::PhantomData,
        }
    }

    /// Push a brand-new stream.
    pub fn fresh() -> Self {
        Self::new(Stream::new())
    }
}

impl Drop for ScopedStream {
    fn drop(&mut self) {
        CURRENT_STREAM.with(|current| current.set(self.previous));
    }
}
