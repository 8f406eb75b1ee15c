//! Per-thread scratch buffers
//!
//! The transform engine allocates a working buffer per pipeline run. Those
//! buffers are size-keyed and cached per thread so repeated encrypts of
//! similarly sized inputs reuse capacity instead of hitting the allocator.
//!
//! Contract notes:
//! - `rent(n)` returns an owned buffer of exactly `n` bytes. Contents are
//!   whatever the previous user left behind; callers own initialization.
//! - `recycle` stores a buffer back under its length key. Buffers that escape
//!   as outputs are simply replaced on the next rent.
//! - The pool is `thread_local`, so sessions on different threads never
//!   contend.

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static POOL: RefCell<HashMap<usize, Vec<u8>>> = RefCell::new(HashMap::new());
}

/// Take a buffer of exactly `size` bytes from the thread pool, allocating
/// when no cached buffer of that size exists. Not zeroed.
pub fn rent(size: usize) -> Vec<u8> {
    POOL.with(|p| {
        if let Some(mut buf) = p.borrow_mut().remove(&size) {
            buf.resize(size, 0);
            return buf;
        }
        vec![0u8; size]
    })
}

/// Hand a buffer back to the thread pool under its length key.
pub fn recycle(buf: Vec<u8>) {
    if buf.is_empty() {
        return;
    }
    POOL.with(|p| {
        p.borrow_mut().insert(buf.len(), buf);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_recycle_reuses_capacity() {
        let mut a = rent(64);
        a[0] = 0xAB;
        let ptr = a.as_ptr();
        recycle(a);
        let b = rent(64);
        // Same thread, same size key: the cached buffer comes back.
        assert_eq!(b.as_ptr(), ptr);
        assert_eq!(b.len(), 64);
        recycle(b);
    }

    #[test]
    fn distinct_sizes_are_distinct_buffers() {
        let a = rent(16);
        let b = rent(32);
        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 32);
        recycle(a);
        recycle(b);
    }
}
