//! Executable stub regions and the typed callables built on top of them.
//!
//! ## How it works
//! - A page-aligned region is allocated read+write at a fixed address (never relocated).
//! - The stub bytes are copied in.
//! - The region is flipped to [`STUB_PROTECTION`] exactly once.
//! - The address is transmuted into an `extern "C"` function pointer of the declared signature.
//!
//! ## Safety
//! The region is never written after protection is granted. A callable owns its region, so the
//! function pointer cannot outlive the code it targets.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::internal::diagnostics::*;
use crate::internal::vm::{HrVirtualAlloc, HrVirtualFree, HrVirtualProtect, STUB_PROTECTION};
use crate::HrOut;

/// A block of instruction bytes hosted in executable memory.
#[derive(Debug)]
pub struct ExecutableStub {
    addr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for ExecutableStub {}
unsafe impl Sync for ExecutableStub {}

impl ExecutableStub {
    /// Hosts `code` in a fresh executable region.
    ///
    /// # Errors
    /// - `InvalidStub` if `code` is empty.
    /// - `PlatformOperation` if the OS refuses the allocation or the protection change. The
    ///   region is released before returning.
    pub fn host(code: &[u8]) -> HrResult<Self> {
        if code.is_empty() {
            return Err(HrError::InvalidStub);
        }

        unsafe {
            let addr = HrVirtualAlloc(code.len())?;
            core::ptr::copy_nonoverlapping(code.as_ptr(), addr.as_ptr(), code.len());

            if let Err(e) = HrVirtualProtect(addr.as_ptr(), code.len(), STUB_PROTECTION) {
                HrVirtualFree(addr.as_ptr(), code.len());
                return Err(e);
            }

            HrOut!("hosted {} bytes @ {:p}", code.len(), addr);
            Ok(Self { addr, len: code.len() })
        }
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.addr.as_ptr()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Current contents of the stub.
    pub fn code(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.addr.as_ptr(), self.len) }
    }
}

impl Drop for ExecutableStub {
    fn drop(&mut self) {
        unsafe {
            if !HrVirtualFree(self.addr.as_ptr(), self.len) {
                HrOut!("release of {:p} failed", self.addr);
            }
        }
    }
}

/// Raw register word a stub can return.
pub trait StubWord: Copy + Default + Send + Sync + 'static {
    /// Calls `code` as `extern "C" fn() -> Self`.
    ///
    /// # Safety
    /// `code` must be executable and implement that signature.
    unsafe fn invoke(code: *const u8) -> Self;

    /// Calls `code` as `extern "C" fn(*mut Self) -> u32`.
    ///
    /// # Safety
    /// `code` must be executable and implement that signature.
    unsafe fn invoke_checked(code: *const u8, out: &mut Self) -> u32;
}

macro_rules! impl_stub_word {
    ($($t:ty),*) => {$(
        impl StubWord for $t {
            #[inline(always)]
            unsafe fn invoke(code: *const u8) -> Self {
                let f: unsafe extern "C" fn() -> $t = core::mem::transmute(code);
                f()
            }

            #[inline(always)]
            unsafe fn invoke_checked(code: *const u8, out: &mut Self) -> u32 {
                let f: unsafe extern "C" fn(*mut $t) -> u32 = core::mem::transmute(code);
                f(out as *mut $t)
            }
        }
    )*};
}

impl_stub_word!(u16, u32, u64);

/// Stub of signature `extern "C" fn() -> T`.
pub struct Callable<T: StubWord> {
    stub: ExecutableStub,
    _ret: PhantomData<fn() -> T>,
}

impl<T: StubWord> Callable<T> {
    /// Makes `code` executable and binds it as `extern "C" fn() -> T`.
    ///
    /// # Safety
    /// `code` must be a complete function body of that signature for the running CPU mode.
    pub unsafe fn prepare(code: &[u8]) -> HrResult<Self> {
        Ok(Self { stub: ExecutableStub::host(code)?, _ret: PhantomData })
    }

    #[inline(always)]
    pub fn call(&self) -> T {
        unsafe { T::invoke(self.stub.as_ptr()) }
    }

    pub fn stub(&self) -> &ExecutableStub {
        &self.stub
    }
}

/// Stub of signature `extern "C" fn(*mut T) -> u32`, returning 0 when no value was produced.
pub struct CheckedCallable<T: StubWord> {
    stub: ExecutableStub,
    _ret: PhantomData<fn() -> T>,
}

impl<T: StubWord> CheckedCallable<T> {
    /// Makes `code` executable and binds it as `extern "C" fn(*mut T) -> u32`.
    ///
    /// # Safety
    /// `code` must be a complete function body of that signature for the running CPU mode, and
    /// must write at most `size_of::<T>()` bytes through the pointer.
    pub unsafe fn prepare(code: &[u8]) -> HrResult<Self> {
        Ok(Self { stub: ExecutableStub::host(code)?, _ret: PhantomData })
    }

    #[inline(always)]
    pub fn call(&self) -> Option<T> {
        let mut out = T::default();
        let ok = unsafe { T::invoke_checked(self.stub.as_ptr(), &mut out) };
        (ok != 0).then_some(out)
    }

    pub fn stub(&self) -> &ExecutableStub {
        &self.stub
    }
}
