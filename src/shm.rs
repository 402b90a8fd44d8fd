//! SharedMemoryBlock (C2) — OS-backed anonymous shared memory regions
//! addressable by a connection-scoped id.
//!
//! The teacher maps named, file-backed regions for cross-process structs
//! (`commy_common::WriterStruct`/`ReaderStruct` over `memmap2::MmapMut`).
//! INC's fast path (spec.md §4.2/§6) only ever needs anonymous, single-writer
//! regions handed off within one connection, so this uses
//! `MmapMut::map_anon` instead of a named/file-backed mapping and drops the
//! reader/writer struct split in favor of a single owning handle plus shared
//! read-only views.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use memmap2::MmapMut;
use parking_lot::RwLock;

use inc_common::WithUniqueId;

use crate::error::{IncError, IncResult};

/// Per-connection id allocator for shared-memory blocks (spec.md §4.2:
/// "id is scoped per connection, allocated monotonically starting at 1").
pub struct ShmIdAllocator;

impl WithUniqueId for ShmIdAllocator {
    fn id_counter() -> &'static AtomicU32 {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        &COUNTER
    }
}

struct Region {
    mmap: RwLock<MmapMut>,
}

/// A single OS-backed anonymous memory region, addressable by `id` within
/// the connection that created it.
#[derive(Clone)]
pub struct SharedMemoryBlock {
    id: u32,
    offset: u32,
    length: u32,
    region: Arc<Region>,
}

impl SharedMemoryBlock {
    /// Allocate a new anonymous block of `length` bytes. `offset` is always
    /// 0 for freshly-created blocks; nonzero offsets arise when a block is
    /// sub-addressed by `attach_at`.
    pub fn create(length: u32) -> IncResult<Self> {
        if length == 0 {
            return Err(IncError::Shm("cannot create a zero-length block".into()));
        }
        let mmap = MmapMut::map_anon(length as usize)
            .map_err(|e| IncError::ShmUnavailable(e.to_string()))?;
        Ok(SharedMemoryBlock {
            id: ShmIdAllocator::next_id(),
            offset: 0,
            length,
            region: Arc::new(Region {
                mmap: RwLock::new(mmap),
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }
    pub fn offset(&self) -> u32 {
        self.offset
    }
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Write `data` at `pos` within this block. `pos + data.len()` must not
    /// exceed `length`.
    pub fn write_at(&self, pos: u32, data: &[u8]) -> IncResult<()> {
        let end = pos as usize + data.len();
        if end > self.length as usize {
            return Err(IncError::Shm(format!(
                "write of {} bytes at offset {} exceeds block length {}",
                data.len(),
                pos,
                self.length
            )));
        }
        let mut mmap = self.region.mmap.write();
        let base = self.offset as usize + pos as usize;
        mmap[base..base + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read `len` bytes starting at `pos` within this block.
    pub fn read_at(&self, pos: u32, len: u32) -> IncResult<Vec<u8>> {
        let end = pos as usize + len as usize;
        if end > self.length as usize {
            return Err(IncError::Shm(format!(
                "read of {} bytes at offset {} exceeds block length {}",
                len, pos, self.length
            )));
        }
        let mmap = self.region.mmap.read();
        let base = self.offset as usize + pos as usize;
        Ok(mmap[base..base + len as usize].to_vec())
    }

    /// A sub-view over `[pos, pos+len)` of this block, sharing the same
    /// backing region and id but carrying its own offset/length — used when
    /// a MEMFD_ATTACH reference addresses a slice of a larger block.
    pub fn attach_at(&self, pos: u32, len: u32) -> IncResult<Self> {
        if pos as usize + len as usize > self.length as usize {
            return Err(IncError::BadShmRef(self.id));
        }
        Ok(SharedMemoryBlock {
            id: self.id,
            offset: self.offset + pos,
            length: len,
            region: self.region.clone(),
        })
    }
}

/// Tracks live shared-memory blocks for one connection, keyed by id, so
/// inbound MEMFD_ATTACH/detach messages can resolve a reference.
#[derive(Default)]
pub struct ShmTable {
    blocks: dashmap::DashMap<u32, SharedMemoryBlock>,
}

impl ShmTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: SharedMemoryBlock) {
        self.blocks.insert(block.id(), block);
    }

    pub fn get(&self, id: u32) -> IncResult<SharedMemoryBlock> {
        self.blocks
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(IncError::BadShmRef(id))
    }

    /// Release a block per the Open Question resolution in SPEC_FULL.md
    /// §9.1: retained until explicit detach or superseded by the next
    /// message on the connection, whichever comes first.
    pub fn remove(&self, id: u32) {
        self.blocks.remove(&id);
    }

    pub fn retain_only(&self, id: u32) {
        self.blocks.retain(|k, _| *k == id);
    }
}
