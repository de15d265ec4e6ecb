use std::sync::Mutex;

use bytes::BytesMut;

/// A small pool of reusable byte buffers. Every enqueued payload is copied
/// into a pooled buffer and the buffer is returned once the worker has
/// finished parsing it, bounding allocation under burst traffic.
#[derive(Default)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> BytesMut {
        self.free
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop()
            .unwrap_or_default()
    }

    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        // Keep the pool from growing without bound if a burst allocated far
        // more buffers than steady-state traffic needs.
        let mut free = self.free.lock().expect("buffer pool mutex poisoned");
        if free.len() < 4096 {
            free.push(buf);
        }
    }
}
