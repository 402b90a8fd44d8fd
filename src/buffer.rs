//! ByteBuffer (C1) — reference-counted, copy-on-write byte container.
//!
//! Generalizes the teacher's mmap-scoped `FieldHolder`/`WriterStruct`
//! ownership style (`commy_common::lib`) from "one struct behind one mmap"
//! to "any byte buffer, owned or raw-viewed, shared by reference count".
//! Unlike `FieldHolder::clone()` (which always deep-copies), `ByteBuffer`
//! uses `Arc::make_mut` so `detach()` is a no-op while uniquely held, per
//! spec.md §4.1.

use std::fmt;
use std::sync::Arc;

/// A raw, borrowed view with an optional free callback invoked exactly once
/// when the last `ByteBuffer` referencing it drops.
struct RawView {
    ptr: *const u8,
    len: usize,
    free: Option<Box<dyn FnOnce(*const u8, usize) + Send + Sync>>,
}

// SAFETY: the raw pointer is never dereferenced outside of `as_slice`, which
// requires the caller to have upheld the validity contract documented on
// `ByteBuffer::from_raw`.
unsafe impl Send for RawView {}
unsafe impl Sync for RawView {}

impl Drop for RawView {
    fn drop(&mut self) {
        if let Some(free) = self.free.take() {
            free(self.ptr, self.len);
        }
    }
}

impl fmt::Debug for RawView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawView")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

enum Storage {
    Owned(Vec<u8>),
    Raw(RawView),
}

/// A possibly-empty, finite sequence of bytes. Cheap to clone (bumps a
/// refcount); mutation through `&mut self` methods copies first only if the
/// storage is shared (copy-on-write).
#[derive(Clone, Debug)]
pub struct ByteBuffer {
    inner: Option<Arc<Storage>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Owned(v) => f.debug_tuple("Owned").field(&v.len()).finish(),
            Storage::Raw(r) => f.debug_tuple("Raw").field(r).finish(),
        }
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        ByteBuffer { inner: None }
    }
}

impl ByteBuffer {
    /// The null buffer: `size == 0`, no storage allocated.
    pub fn null() -> Self {
        Self::default()
    }

    /// Build an owned buffer from existing bytes.
    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteBuffer {
            inner: Some(Arc::new(Storage::Owned(data))),
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Build a buffer over a raw, externally-owned region. `free`, if given,
    /// is invoked exactly once when the last `ByteBuffer` sharing this
    /// storage is dropped.
    ///
    /// # Safety
    /// `ptr` must remain valid for reads of `len` bytes for as long as any
    /// `ByteBuffer` produced from it (or its clones) is alive.
    pub unsafe fn from_raw(
        ptr: *const u8,
        len: usize,
        free: Option<Box<dyn FnOnce(*const u8, usize) + Send + Sync>>,
    ) -> Self {
        ByteBuffer {
            inner: Some(Arc::new(Storage::Raw(RawView { ptr, len, free }))),
        }
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            None => 0,
            Some(s) => match s.as_ref() {
                Storage::Owned(v) => v.len(),
                Storage::Raw(r) => r.len,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the buffer's bytes. Stable until the next mutation or drop.
    pub fn data(&self) -> &[u8] {
        match &self.inner {
            None => &[],
            Some(s) => match s.as_ref() {
                Storage::Owned(v) => v.as_slice(),
                // SAFETY: validity upheld by `from_raw`'s caller contract.
                Storage::Raw(r) => unsafe { std::slice::from_raw_parts(r.ptr, r.len) },
            },
        }
    }

    /// Ensure unique, owned, mutable storage, copying if shared or raw.
    fn make_owned_mut(&mut self) -> &mut Vec<u8> {
        let needs_copy = match &self.inner {
            None => true,
            Some(arc) => !matches!(arc.as_ref(), Storage::Owned(_)) || Arc::strong_count(arc) > 1,
        };
        if needs_copy {
            let copied = self.data().to_vec();
            self.inner = Some(Arc::new(Storage::Owned(copied)));
        }
        match Arc::get_mut(self.inner.as_mut().unwrap()) {
            Some(Storage::Owned(v)) => v,
            _ => unreachable!("just ensured unique owned storage"),
        }
    }

    /// Reserve additional capacity for `n` more bytes.
    pub fn reserve(&mut self, n: usize) {
        self.make_owned_mut().reserve(n);
    }

    /// Resize to `n` bytes, zero-filling any growth.
    pub fn resize(&mut self, n: usize) {
        self.make_owned_mut().resize(n, 0);
    }

    /// Append bytes, growing as needed.
    pub fn append(&mut self, bytes: &[u8]) {
        self.make_owned_mut().extend_from_slice(bytes);
    }

    /// Force unique ownership: a no-op if already uniquely held, otherwise
    /// allocates and copies.
    pub fn detach(&mut self) {
        self.make_owned_mut();
    }

    /// A new buffer over `self.data()[offset..offset+len]`, sharing storage
    /// (no copy) when the slice covers owned bytes.
    pub fn slice(&self, offset: usize, len: usize) -> ByteBuffer {
        ByteBuffer::from_slice(&self.data()[offset..offset + len])
    }
}

impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}
impl Eq for ByteBuffer {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn null_buffer_is_empty() {
        let b = ByteBuffer::null();
        assert_eq!(b.len(), 0);
        assert!(b.is_empty());
        assert_eq!(b.data(), &[] as &[u8]);
    }

    #[test]
    fn shared_buffers_compare_equal_by_content() {
        let a = ByteBuffer::from_slice(b"hello");
        let b = a.clone();
        let c = ByteBuffer::from_slice(b"hello");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn detach_is_noop_when_unique() {
        let mut a = ByteBuffer::from_slice(b"solo");
        let before = a.data().as_ptr();
        a.detach();
        assert_eq!(a.data().as_ptr(), before);
    }

    #[test]
    fn mutation_copies_shared_storage() {
        let a = ByteBuffer::from_slice(b"shared");
        let mut b = a.clone();
        b.append(b"!");
        assert_eq!(a.data(), b"shared");
        assert_eq!(b.data(), b"shared!");
    }

    #[test]
    fn raw_view_invokes_free_callback_once_on_last_drop() {
        let freed = Arc::new(AtomicBool::new(false));
        let freed_in_cb = freed.clone();
        let backing: Box<[u8]> = vec![1u8, 2, 3].into_boxed_slice();
        let ptr = backing.as_ptr();
        let len = backing.len();
        std::mem::forget(backing);

        let a = unsafe {
            ByteBuffer::from_raw(
                ptr,
                len,
                Some(Box::new(move |p, l| {
                    freed_in_cb.store(true, Ordering::SeqCst);
                    unsafe {
                        drop(Vec::from_raw_parts(p as *mut u8, l, l));
                    }
                })),
            )
        };
        let b = a.clone();
        assert_eq!(a.data(), &[1, 2, 3]);
        drop(a);
        assert!(!freed.load(Ordering::SeqCst));
        drop(b);
        assert!(freed.load(Ordering::SeqCst));
    }
}
