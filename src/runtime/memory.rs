// Executable memory for code blocks. ExecutableRegion owns one anonymous mapping divided into
// page-aligned blocks, so every block can change protection on its own. Writing into a block
// goes through WritableScope: opening a scope takes the process-wide write lock and asks the
// protection backend to make the block writable; publish() hands it back as executable and
// flushes the instruction cache over it, and dropping an unpublished scope (an error path or
// an unwind) still restores execute permission before the lock is released.
//
// Two backends exist. NoToggle maps the pages read-write-execute once and never touches them
// again, for hosts that do not enforce W^X. ToggleRestore flips the block between read-write
// and read-execute with mprotect or VirtualProtect, or, on Apple silicon where the mapping
// carries MAP_JIT, flips the calling thread's view with pthread_jit_write_protect_np. The
// cargo feature rwx-pages picks NoToggle; the cache and generator only see ActiveBackend.

//! Executable code-block memory and the scoped W^X protocol.

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::io;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use crate::core::error::{JitError, JitResult};

/// Page protection requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadExecute,
    ReadWriteExecute,
}

/// Serializes every writable window in the process. On hosts where the toggle is per process
/// (or per thread but shared code pages), two caches must not generate at the same time.
static WRITE_LOCK: Mutex<()> = parking_lot::const_mutex(());

static PAGE_SIZE: Lazy<usize> = Lazy::new(sys::page_size);

/// Host page size in bytes.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Round `bytes` up to whole pages. Never returns zero.
pub fn round_up_to_page(bytes: usize) -> usize {
    bytes.max(1).next_multiple_of(page_size())
}

/// Make freshly written code at `ptr..ptr + len` visible to instruction fetch.
///
/// # Safety
///
/// The range must lie inside a live mapping.
pub unsafe fn flush_icache(ptr: *const u8, len: usize) {
    sys::flush_icache(ptr, len);
}

/// How a block is switched between writable and executable.
pub trait ProtectionBackend: Default {
    /// Access the whole mapping is created with.
    const INITIAL: Access;

    /// Make `len` bytes at `ptr` writable for the calling thread.
    ///
    /// # Safety
    ///
    /// The range must be page aligned and inside a mapping created with [`Self::INITIAL`].
    unsafe fn open(&self, ptr: *mut u8, len: usize) -> io::Result<()>;

    /// Make the range executable again.
    ///
    /// # Safety
    ///
    /// Same contract as [`ProtectionBackend::open`].
    unsafe fn close(&self, ptr: *mut u8, len: usize) -> io::Result<()>;
}

/// Pages stay read-write-execute for the lifetime of the mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToggle;

impl ProtectionBackend for NoToggle {
    const INITIAL: Access = Access::ReadWriteExecute;

    unsafe fn open(&self, _ptr: *mut u8, _len: usize) -> io::Result<()> {
        Ok(())
    }

    unsafe fn close(&self, _ptr: *mut u8, _len: usize) -> io::Result<()> {
        Ok(())
    }
}

/// Blocks are writable only inside a [`WritableScope`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ToggleRestore;

impl ProtectionBackend for ToggleRestore {
    const INITIAL: Access = sys::TOGGLE_INITIAL;

    unsafe fn open(&self, ptr: *mut u8, len: usize) -> io::Result<()> {
        sys::begin_write(ptr, len)
    }

    unsafe fn close(&self, ptr: *mut u8, len: usize) -> io::Result<()> {
        sys::end_write(ptr, len)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rwx-pages")] {
        /// Backend selected at build time.
        pub type ActiveBackend = NoToggle;
    } else {
        /// Backend selected at build time.
        pub type ActiveBackend = ToggleRestore;
    }
}

/// One mapping holding `blocks` code blocks of `capacity` bytes each.
pub struct ExecutableRegion<B: ProtectionBackend = ActiveBackend> {
    base: NonNull<u8>,
    size: usize,
    stride: usize,
    capacity: usize,
    blocks: usize,
    backend: B,
}

// The region owns its mapping exclusively; nothing else holds the base pointer.
unsafe impl<B: ProtectionBackend + Send> Send for ExecutableRegion<B> {}

impl<B: ProtectionBackend> ExecutableRegion<B> {
    /// Map `blocks` blocks, each able to hold `capacity` bytes of code.
    pub fn new(blocks: usize, capacity: usize) -> JitResult<Self> {
        let capacity = capacity & !3;
        let stride = round_up_to_page(capacity);
        let size = stride * blocks.max(1);
        let base = unsafe { sys::map(size, B::INITIAL) }
            .map_err(|source| JitError::MapFailed { size, source })?;
        debug!(
            "mapped {} code blocks of {} bytes ({} byte stride) at {:p}",
            blocks, capacity, stride, base
        );
        Ok(Self {
            base,
            size,
            stride,
            capacity,
            blocks,
            backend: B::default(),
        })
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Usable bytes per block.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Distance between two blocks, a whole number of pages.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Size of the whole mapping.
    pub fn size(&self) -> usize {
        self.size
    }

    fn block_base(&self, index: usize) -> *mut u8 {
        assert!(index < self.blocks, "block {index} out of {}", self.blocks);
        unsafe { self.base.as_ptr().add(index * self.stride) }
    }

    /// Entry point of block `index`.
    pub fn block_ptr(&self, index: usize) -> *const u32 {
        self.block_base(index) as *const u32
    }

    /// The code words of block `index`. Every backend keeps blocks readable.
    pub fn block(&self, index: usize) -> &[u32] {
        unsafe { slice::from_raw_parts(self.block_ptr(index), self.capacity / 4) }
    }

    /// Open block `index` for writing.
    pub fn writable(&mut self, index: usize) -> JitResult<WritableScope<'_, B>> {
        let lock = WRITE_LOCK.lock();
        let ptr = self.block_base(index);
        unsafe { self.backend.open(ptr, self.stride) }.map_err(JitError::Protection)?;
        trace!("block {index} writable");
        Ok(WritableScope {
            region: self,
            index,
            published: false,
            _lock: lock,
        })
    }
}

impl<B: ProtectionBackend> Drop for ExecutableRegion<B> {
    fn drop(&mut self) {
        if let Err(err) = unsafe { sys::unmap(self.base.as_ptr(), self.size) } {
            warn!("failed to unmap code blocks at {:p}: {err}", self.base);
        }
    }
}

/// A code block that is writable for as long as the scope lives.
pub struct WritableScope<'r, B: ProtectionBackend = ActiveBackend> {
    region: &'r mut ExecutableRegion<B>,
    index: usize,
    published: bool,
    _lock: MutexGuard<'static, ()>,
}

impl<B: ProtectionBackend> WritableScope<'_, B> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Make the block executable and flush the instruction cache over it.
    ///
    /// If the backend refuses, the scope stays unpublished and dropping it tries the restore
    /// once more.
    pub fn publish(mut self) -> JitResult<()> {
        let ptr = self.region.block_base(self.index);
        let len = self.region.stride;
        unsafe {
            self.region.backend.close(ptr, len).map_err(JitError::Protection)?;
            self.published = true;
            sys::flush_icache(ptr, len);
        }
        trace!("block {} published", self.index);
        Ok(())
    }
}

impl<B: ProtectionBackend> Deref for WritableScope<'_, B> {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        self.region.block(self.index)
    }
}

impl<B: ProtectionBackend> DerefMut for WritableScope<'_, B> {
    fn deref_mut(&mut self) -> &mut [u32] {
        let words = self.region.capacity / 4;
        let ptr = self.region.block_base(self.index) as *mut u32;
        unsafe { slice::from_raw_parts_mut(ptr, words) }
    }
}

impl<B: ProtectionBackend> Drop for WritableScope<'_, B> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let ptr = self.region.block_base(self.index);
        if let Err(err) = unsafe { self.region.backend.close(ptr, self.region.stride) } {
            warn!("failed to restore protection of block {}: {err}", self.index);
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod posix;
        use posix as sys;
    } else if #[cfg(windows)] {
        mod win;
        use win as sys;
    } else {
        compile_error!("executable memory is only implemented for unix and windows hosts");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn blocks_are_page_aligned() {
        let region = ExecutableRegion::<ActiveBackend>::new(4, 100).unwrap();
        assert_eq!(region.capacity(), 100);
        assert_eq!(region.stride() % page_size(), 0);
        assert_eq!(region.size(), region.stride() * 4);
        for i in 0..4 {
            assert_eq!(region.block_ptr(i) as usize % page_size(), 0);
        }
    }

    #[test]
    fn published_words_are_readable() {
        let mut region = ExecutableRegion::<ActiveBackend>::new(2, 64).unwrap();
        {
            let mut scope = region.writable(1).unwrap();
            assert_eq!(scope.len(), 16);
            scope[0] = 0xd65f_03c0;
            scope[15] = 0xd503_201f;
            scope.publish().unwrap();
        }
        assert_eq!(region.block(1)[0], 0xd65f_03c0);
        assert_eq!(region.block(1)[15], 0xd503_201f);
        assert_eq!(region.block(0)[0], 0);
    }

    #[test]
    fn dropped_scope_releases_the_lock() {
        let mut region = ExecutableRegion::<ActiveBackend>::new(1, 64).unwrap();
        {
            let mut scope = region.writable(0).unwrap();
            scope[0] = 1;
        }
        // A second window would deadlock if the first had not released the lock.
        let scope = region.writable(0).unwrap();
        assert_eq!(scope[0], 1);
        scope.publish().unwrap();
    }

    #[test]
    #[cfg_attr(all(target_vendor = "apple", target_arch = "aarch64"), ignore)]
    fn no_toggle_backend_maps_rwx() {
        let mut region = ExecutableRegion::<NoToggle>::new(1, 16).unwrap();
        let mut scope = region.writable(0).unwrap();
        scope[3] = 7;
        scope.publish().unwrap();
        assert_eq!(region.block(0)[3], 7);
    }

    static CLOSE_CALLS: AtomicUsize = AtomicUsize::new(0);

    /// Counts restore attempts and refuses every one of them.
    #[derive(Debug, Default)]
    struct RefusesClose;

    impl ProtectionBackend for RefusesClose {
        const INITIAL: Access = ToggleRestore::INITIAL;

        unsafe fn open(&self, ptr: *mut u8, len: usize) -> io::Result<()> {
            ToggleRestore.open(ptr, len)
        }

        unsafe fn close(&self, _ptr: *mut u8, _len: usize) -> io::Result<()> {
            CLOSE_CALLS.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    #[test]
    fn failed_publish_retries_the_restore_on_drop() {
        let mut region = ExecutableRegion::<RefusesClose>::new(1, 64).unwrap();
        let scope = region.writable(0).unwrap();
        let err = scope.publish().unwrap_err();
        assert!(matches!(err, JitError::Protection(_)));
        assert_eq!(CLOSE_CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn page_rounding() {
        let page = page_size();
        assert_eq!(round_up_to_page(0), page);
        assert_eq!(round_up_to_page(page), page);
        assert_eq!(round_up_to_page(page + 4), 2 * page);
    }
}
