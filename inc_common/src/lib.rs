//! Small, dependency-light primitives shared by the INC transport crate.
//!
//! This crate plays the same role the teacher's `commy_common` plays for
//! `commy`: a grab-bag of process-local helpers that don't belong in the
//! main crate's module tree because they're generic enough to stand alone.

use std::sync::atomic::{AtomicU32, Ordering};

/// Types that hand out unique, monotonically increasing 32-bit ids from a
/// process-local counter.
///
/// Used for shared-memory block ids (scoped to the sending connection, see
/// `SharedMemoryBlock`) and anywhere else a cheap collision-free id is
/// needed without coordinating across processes.
pub trait WithUniqueId {
    /// A reference to a static counter unique to this type.
    fn id_counter() -> &'static AtomicU32;

    /// Allocate the next id. Wraps at `u32::MAX` back to 0 rather than
    /// failing — callers that need collision freedom across a wrap must
    /// scope ids further (e.g. by connection), as `SharedMemoryBlock` does.
    fn next_id() -> u32 {
        Self::id_counter().fetch_add(1, Ordering::Relaxed)
    }
}
