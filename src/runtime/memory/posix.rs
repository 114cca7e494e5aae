// mmap-backed code blocks. On Apple silicon the mapping is created read-write-execute with
// MAP_JIT and W^X is a per-thread switch (pthread_jit_write_protect_np) rather than a page
// protection change, so begin_write/end_write flip that switch and ignore the range.

use std::io;
use std::ptr::{self, NonNull};

use super::Access;

fn prot(access: Access) -> libc::c_int {
    match access {
        Access::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        Access::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
        Access::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
    }
}

pub(super) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

pub(super) unsafe fn map(size: usize, access: Access) -> io::Result<NonNull<u8>> {
    #[allow(unused_mut)]
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANON;
    #[cfg(all(target_vendor = "apple", target_arch = "aarch64"))]
    if access != Access::ReadWrite {
        flags |= libc::MAP_JIT;
    }

    let address = libc::mmap(ptr::null_mut(), size, prot(access), flags, -1, 0);
    if address == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(address.cast()).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
}

pub(super) unsafe fn unmap(ptr: *mut u8, size: usize) -> io::Result<()> {
    if libc::munmap(ptr.cast(), size) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg_attr(all(target_vendor = "apple", target_arch = "aarch64"), allow(dead_code))]
unsafe fn protect(ptr: *mut u8, len: usize, access: Access) -> io::Result<()> {
    if libc::mprotect(ptr.cast(), len, prot(access)) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

cfg_if::cfg_if! {
    if #[cfg(all(target_vendor = "apple", target_arch = "aarch64"))] {
        extern "C" {
            fn pthread_jit_write_protect_np(enabled: libc::c_int);
            fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
        }

        pub(super) const TOGGLE_INITIAL: Access = Access::ReadWriteExecute;

        pub(super) unsafe fn begin_write(_ptr: *mut u8, _len: usize) -> io::Result<()> {
            pthread_jit_write_protect_np(0);
            Ok(())
        }

        pub(super) unsafe fn end_write(_ptr: *mut u8, _len: usize) -> io::Result<()> {
            pthread_jit_write_protect_np(1);
            Ok(())
        }

        pub(super) unsafe fn flush_icache(ptr: *const u8, len: usize) {
            sys_icache_invalidate(ptr as *mut libc::c_void, len);
        }
    } else {
        pub(super) const TOGGLE_INITIAL: Access = Access::ReadExecute;

        pub(super) unsafe fn begin_write(ptr: *mut u8, len: usize) -> io::Result<()> {
            protect(ptr, len, Access::ReadWrite)
        }

        pub(super) unsafe fn end_write(ptr: *mut u8, len: usize) -> io::Result<()> {
            protect(ptr, len, Access::ReadExecute)
        }

        #[cfg(target_arch = "aarch64")]
        pub(super) unsafe fn flush_icache(ptr: *const u8, len: usize) {
            extern "C" {
                fn __clear_cache(begin: *mut libc::c_char, end: *mut libc::c_char);
            }
            let begin = ptr as *mut libc::c_char;
            __clear_cache(begin, begin.add(len));
        }

        // Instruction fetch is coherent with stores on the remaining hosts.
        #[cfg(not(target_arch = "aarch64"))]
        pub(super) unsafe fn flush_icache(_ptr: *const u8, _len: usize) {}
    }
}
