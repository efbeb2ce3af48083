use core::fmt;

use thiserror::Error;

use crate::internal::dispatch::Width;

/// OS memory operation that can be refused while hosting a stub.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub enum PlatformOp {
    Alloc,
    Protect,
}

impl fmt::Display for PlatformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformOp::Alloc => f.write_str("alloc"),
            PlatformOp::Protect => f.write_str("protect"),
        }
    }
}

#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug, Error)]
pub enum HrError {
    /// CPU implements neither RDRAND nor RDSEED.
    #[error("cpu supports neither RDRAND nor RDSEED")]
    UnsupportedHardware,

    /// 64-bit generation requested outside a 64-bit execution mode.
    #[error("64-bit generation requires a 64-bit execution mode")]
    ArchitectureMismatch,

    /// `minimum >= maximum`.
    #[error("minimum must be strictly less than maximum")]
    InvalidRange,

    /// Modulo-mapped range with `maximum == 0`.
    #[error("maximum of zero leaves no modulus")]
    ZeroMaximum,

    /// Width-specific stub was never prepared.
    #[error("{0} stub was never prepared")]
    UninitializedCallable(Width),

    /// The OS refused an allocation or protection change.
    #[error("os refused memory {op} (code {code})")]
    PlatformOperation { op: PlatformOp, code: i32 },

    /// Every checked draw reported CF=0.
    #[error("no entropy produced after {attempts} attempts")]
    EntropyUnavailable { attempts: u32 },

    #[error("stub has no instructions")]
    InvalidStub,
}

pub type HrResult<T> = Result<T, HrError>;

/// Builds a `PlatformOperation` from the calling thread's last OS error.
#[inline(always)]
pub(crate) fn HrPlatformErr(op: PlatformOp) -> HrError {
    let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(-1);
    HrError::PlatformOperation { op, code }
}

#[doc(hidden)]
pub fn HrEmit(msg: &str) {
    println!("{}", msg);

    #[cfg(windows)]
    unsafe {
        use std::ffi::CString;
        use winapi::um::debugapi::OutputDebugStringA;

        if let Ok(cmsg) = CString::new(msg) {
            OutputDebugStringA(cmsg.as_ptr());
        }
    }
}

#[macro_export]
macro_rules! HrOut {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        {
            let module_path = module_path!();
            let tag = module_path.split("::").last().unwrap_or("UNKNOWN");

            let msg = format!(
                "[HR:{}][{:?}] {}",
                tag.to_uppercase(),
                std::thread::current().id(),
                format!($($arg)*)
            );

            $crate::internal::diagnostics::HrEmit(&msg);
        }
    };
}
