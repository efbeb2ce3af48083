//! Page-granular memory wrappers used to host instruction stubs.
//!
//! Design:
//! - Windows: `VirtualAlloc` / `VirtualProtect` / `VirtualFree` from `winapi`.
//! - Unix: anonymous `mmap` / `mprotect` / `munmap` from `libc`.
//! - Regions are allocated read+write, filled, then flipped to an executable protection once.
//!
//! Every refusal from the OS is surfaced as `HrError::PlatformOperation` carrying the OS error
//! code. There is no retry.

use once_cell::sync::OnceCell;

use crate::internal::diagnostics::*;
use crate::HrOut;

/// Page protection requested from the OS.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Protection {
    ReadWrite,
    ReadExecute,
    ReadWriteExecute,
}

/// Protection granted to stub pages once their bytes are in place.
#[cfg(feature = "secure")]
pub const STUB_PROTECTION: Protection = Protection::ReadExecute;
#[cfg(not(feature = "secure"))]
pub const STUB_PROTECTION: Protection = Protection::ReadWriteExecute;

static PAGE_SIZE: OnceCell<usize> = OnceCell::new();

/// Rounds `len` up to a whole number of pages (at least one).
#[inline(always)]
pub fn HrPageAlign(len: usize) -> usize {
    let page = HrPageSize();
    let len = len.max(1);
    (len + page - 1) & !(page - 1)
}

#[cfg(windows)]
mod os {
    use core::ptr::{null_mut, NonNull};

    use winapi::shared::minwindef::DWORD;
    use winapi::um::memoryapi::{VirtualAlloc, VirtualFree, VirtualProtect};
    use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
    use winapi::um::winnt::{
        MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
        PAGE_READWRITE,
    };

    use super::Protection;
    use crate::internal::diagnostics::*;
    use crate::HrOut;

    fn flags(prot: Protection) -> DWORD {
        match prot {
            Protection::ReadWrite => PAGE_READWRITE,
            Protection::ReadExecute => PAGE_EXECUTE_READ,
            Protection::ReadWriteExecute => PAGE_EXECUTE_READWRITE,
        }
    }

    pub fn page_size() -> usize {
        let mut info: SYSTEM_INFO = unsafe { core::mem::zeroed() };
        unsafe { GetSystemInfo(&mut info) };
        info.dwPageSize as usize
    }

    pub unsafe fn alloc(len: usize) -> HrResult<NonNull<u8>> {
        let p = VirtualAlloc(null_mut(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) as *mut u8;
        NonNull::new(p).ok_or_else(|| HrPlatformErr(PlatformOp::Alloc))
    }

    pub unsafe fn protect(addr: *mut u8, len: usize, prot: Protection) -> HrResult<()> {
        let mut old: DWORD = 0;
        if VirtualProtect(addr as _, len, flags(prot), &mut old) == 0 {
            return Err(HrPlatformErr(PlatformOp::Protect));
        }
        HrOut!("{:p}: protection 0x{:X} -> {:?}", addr, old, prot);
        Ok(())
    }

    pub unsafe fn free(addr: *mut u8, _len: usize) -> bool {
        VirtualFree(addr as _, 0, MEM_RELEASE) != 0
    }
}

#[cfg(unix)]
mod os {
    use core::ptr::{null_mut, NonNull};

    use super::Protection;
    use crate::internal::diagnostics::*;
    use crate::HrOut;

    fn flags(prot: Protection) -> libc::c_int {
        match prot {
            Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            Protection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
            Protection::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        }
    }

    pub fn page_size() -> usize {
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz <= 0 {
            0x1000
        } else {
            sz as usize
        }
    }

    pub unsafe fn alloc(len: usize) -> HrResult<NonNull<u8>> {
        let p = libc::mmap(
            null_mut(),
            len,
            flags(Protection::ReadWrite),
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if p == libc::MAP_FAILED {
            return Err(HrPlatformErr(PlatformOp::Alloc));
        }
        NonNull::new(p as *mut u8).ok_or_else(|| HrPlatformErr(PlatformOp::Alloc))
    }

    pub unsafe fn protect(addr: *mut u8, len: usize, prot: Protection) -> HrResult<()> {
        if libc::mprotect(addr as *mut libc::c_void, len, flags(prot)) != 0 {
            return Err(HrPlatformErr(PlatformOp::Protect));
        }
        HrOut!("{:p}: protection -> {:?}", addr, prot);
        Ok(())
    }

    pub unsafe fn free(addr: *mut u8, len: usize) -> bool {
        libc::munmap(addr as *mut libc::c_void, len) == 0
    }
}

#[cfg(not(any(windows, unix)))]
mod os {
    use core::ptr::NonNull;

    use super::Protection;
    use crate::internal::diagnostics::*;

    pub fn page_size() -> usize {
        0x1000
    }

    pub unsafe fn alloc(_len: usize) -> HrResult<NonNull<u8>> {
        Err(HrError::PlatformOperation { op: PlatformOp::Alloc, code: -1 })
    }

    pub unsafe fn protect(_addr: *mut u8, _len: usize, _prot: Protection) -> HrResult<()> {
        Err(HrError::PlatformOperation { op: PlatformOp::Protect, code: -1 })
    }

    pub unsafe fn free(_addr: *mut u8, _len: usize) -> bool {
        false
    }
}

/// System page size, queried once.
pub fn HrPageSize() -> usize {
    *PAGE_SIZE.get_or_init(os::page_size)
}

/// Allocates `len` bytes (rounded up to pages) of read+write memory at a fixed address.
///
/// # Safety
/// The returned region must be released with [`HrVirtualFree`] using the same `len`.
pub unsafe fn HrVirtualAlloc(len: usize) -> HrResult<core::ptr::NonNull<u8>> {
    let len = HrPageAlign(len);
    let p = os::alloc(len);
    if p.is_err() {
        HrOut!("alloc of 0x{:X} bytes refused", len);
    }
    p
}

/// Changes the protection of `[addr, addr + len)`.
///
/// # Safety
/// `addr` must come from [`HrVirtualAlloc`] and `len` must not exceed the allocation.
pub unsafe fn HrVirtualProtect(addr: *mut u8, len: usize, prot: Protection) -> HrResult<()> {
    let r = os::protect(addr, HrPageAlign(len), prot);
    if let Err(e) = &r {
        HrOut!("protect {:p} -> {:?} failed: {}", addr, prot, e);
    }
    r
}

/// Releases a region obtained from [`HrVirtualAlloc`].
///
/// # Safety
/// No pointer into the region may be used afterwards.
pub unsafe fn HrVirtualFree(addr: *mut u8, len: usize) -> bool {
    os::free(addr, HrPageAlign(len))
}
