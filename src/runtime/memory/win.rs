// VirtualAlloc-backed code blocks.

use std::io;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree, VirtualProtect};
use winapi::um::processthreadsapi::{FlushInstructionCache, GetCurrentProcess};
use winapi::um::sysinfoapi::{GetSystemInfo, LPSYSTEM_INFO, SYSTEM_INFO};
use winapi::um::winnt::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
    PAGE_READWRITE,
};

use super::Access;

pub(super) const TOGGLE_INITIAL: Access = Access::ReadExecute;

fn page_protection(access: Access) -> u32 {
    match access {
        Access::ReadWrite => PAGE_READWRITE,
        Access::ReadExecute => PAGE_EXECUTE_READ,
        Access::ReadWriteExecute => PAGE_EXECUTE_READWRITE,
    }
}

pub(super) fn page_size() -> usize {
    unsafe {
        let mut info = MaybeUninit::<SYSTEM_INFO>::zeroed().assume_init();
        GetSystemInfo(&mut info as LPSYSTEM_INFO);
        info.dwPageSize as usize
    }
}

pub(super) unsafe fn map(size: usize, access: Access) -> io::Result<NonNull<u8>> {
    let address = VirtualAlloc(
        ptr::null_mut(),
        size as _,
        MEM_RESERVE | MEM_COMMIT,
        page_protection(access),
    );
    NonNull::new(address.cast()).ok_or_else(io::Error::last_os_error)
}

pub(super) unsafe fn unmap(ptr: *mut u8, _size: usize) -> io::Result<()> {
    if VirtualFree(ptr.cast(), 0, MEM_RELEASE) == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

unsafe fn protect(ptr: *mut u8, len: usize, access: Access) -> io::Result<()> {
    let mut old = 0;
    if VirtualProtect(ptr.cast(), len as _, page_protection(access), &mut old) == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(super) unsafe fn begin_write(ptr: *mut u8, len: usize) -> io::Result<()> {
    protect(ptr, len, Access::ReadWrite)
}

pub(super) unsafe fn end_write(ptr: *mut u8, len: usize) -> io::Result<()> {
    protect(ptr, len, Access::ReadExecute)
}

pub(super) unsafe fn flush_icache(ptr: *const u8, len: usize) {
    FlushInstructionCache(GetCurrentProcess(), ptr.cast(), len as _);
}
